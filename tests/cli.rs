extern crate assert_cmd;
extern crate image;
extern crate predicates;
extern crate tempfile;
extern crate tilebrot;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;
use tempfile::tempdir;
use tilebrot::kernel::render_frame;
use tilebrot::{Config, Raster};

fn expected_gray(viewport: &tilebrot::Viewport, raster: Raster) -> Vec<u8> {
    render_frame(raster, viewport)
        .iter()
        .map(|&v| (v >> 8) as u8)
        .collect()
}

#[test]
fn renders_the_default_view() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("home.pgm");
    Command::cargo_bin("tilebrot")
        .unwrap()
        .args(&["-s", "64x36", "-i", "80", "-t", "1", "-o"])
        .arg(&out)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Method: cpu")
                .and(predicate::str::contains("Iterations: 80")),
        );

    let img = image::open(&out).unwrap().to_luma();
    assert_eq!(img.dimensions(), (64, 36));

    let mut config = Config::with_size(64, 36);
    config.iteration_cap = 80;
    let expected = expected_gray(&config.default_viewport().unwrap(), Raster::new(64, 36));
    assert_eq!(img.into_raw(), expected);
}

#[test]
fn applies_inputs_in_order() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("zoomed.pgm");
    Command::cargo_bin("tilebrot")
        .unwrap()
        .args(&["-s", "64x36", "-i", "40", "-t", "1"])
        .args(&["--click", "32,18", "--more", "--click", "10,5"])
        .arg("-o")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Iterations: 50"));

    let mut config = Config::with_size(64, 36);
    config.iteration_cap = 40;
    let raster = Raster::new(64, 36);
    let vp = config
        .default_viewport()
        .unwrap()
        .zoom_at(32.0, 18.0, raster, config.aspect_ratio)
        .more_iterations()
        .zoom_at(10.0, 5.0, raster, config.aspect_ratio);
    let img = image::open(&out).unwrap().to_luma();
    assert_eq!(img.into_raw(), expected_gray(&vp, raster));
}

#[test]
fn offload_backend_produces_the_same_picture() {
    let dir = tempdir().unwrap();
    let cpu = dir.path().join("cpu.pgm");
    let offload = dir.path().join("offload.pgm");
    for (backend, path) in &[("cpu", &cpu), ("offload", &offload)] {
        Command::cargo_bin("tilebrot")
            .unwrap()
            .args(&["-s", "48x27", "-i", "60", "-t", "1", "-b", *backend, "-o"])
            .arg(path)
            .assert()
            .success()
            .stdout(predicate::str::contains(format!("Method: {}", backend)));
    }
    let a = image::open(&cpu).unwrap().to_luma().into_raw();
    let b = image::open(&offload).unwrap().to_luma().into_raw();
    assert_eq!(a, b);
}

#[test]
fn rejects_a_bad_size() {
    Command::cargo_bin("tilebrot")
        .unwrap()
        .args(&["-s", "wide", "-o", "never.pgm"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not parse output image size"));
}

#[test]
fn rejects_more_bands_than_rows() {
    let dir = tempdir().unwrap();
    Command::cargo_bin("tilebrot")
        .unwrap()
        .args(&["-s", "16x9", "-c", "10", "-t", "1", "-o"])
        .arg(dir.path().join("never.pgm"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

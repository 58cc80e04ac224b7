// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

extern crate clap;
extern crate env_logger;
extern crate failure;
extern crate image;
extern crate num_cpus;
extern crate tilebrot;

use clap::{App, Arg, ArgMatches};
use image::pnm::PNMEncoder;
use image::pnm::{PNMSubtype, SampleEncoding};
use image::ColorType;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tilebrot::{BackendKind, Config, Dispatcher};

fn parse_pair<T>(s: &str, separator: char) -> Option<(T, T)>
where
    T: FromStr,
{
    match s.find(separator) {
        None => None,
        Some(index) => match (T::from_str(&s[..index]), T::from_str(&s[index + 1..])) {
            (Ok(l), Ok(r)) => Some((l, r)),
            _ => None,
        },
    }
}

fn validate_pair<T: FromStr>(s: &str, separator: char, err: &str) -> Result<(), String> {
    match parse_pair::<T>(s, separator) {
        Some(_) => Ok(()),
        None => Err(err.to_string()),
    }
}

fn validate_range<T: FromStr + Ord>(
    s: &str,
    low: T,
    high: T,
    isnotanumber_err: &str,
    isnotinrange_err: &str,
) -> Result<(), String> {
    match T::from_str(s) {
        Ok(i) => {
            if i >= low && i <= high {
                Ok(())
            } else {
                Err(isnotinrange_err.to_string())
            }
        }
        Err(_) => Err(isnotanumber_err.to_string()),
    }
}

const OUTPUT: &str = "output";
const SIZE: &str = "size";
const THREADS: &str = "threads";
const ITERATIONS: &str = "iterations";
const CHUNKS: &str = "chunks";
const BACKEND: &str = "backend";
const CLICK: &str = "click";
const MORE: &str = "more";
const LESS: &str = "less";
const RESET: &str = "reset";
const SWITCH: &str = "switch";
const SETTLE: &str = "settle";

fn args<'a>() -> ArgMatches<'a> {
    let max_threads = num_cpus::get();

    App::new("tilebrot")
        .version("0.1.0")
        .author("Elf M. Sternberg <elf.sternberg@gmail.com>")
        .about("Renders a Mandelbrot view through the tile-parallel explorer engine")
        .arg(
            Arg::with_name(OUTPUT)
                .required(true)
                .long(OUTPUT)
                .short("o")
                .takes_value(true)
                .help("Output file (binary PGM)"),
        )
        .arg(
            Arg::with_name(SIZE)
                .required(false)
                .long(SIZE)
                .short("s")
                .takes_value(true)
                .default_value("1280x720")
                .validator(|s| validate_pair::<u32>(&s, 'x', "Could not parse output image size"))
                .help("Size of output image"),
        )
        .arg(
            Arg::with_name(THREADS)
                .required(false)
                .long(THREADS)
                .short("t")
                .takes_value(true)
                .validator(move |s| {
                    validate_range(
                        &s,
                        1,
                        max_threads,
                        "Could not parse thread count",
                        &format!("Thread count must be between 1 and {}", max_threads),
                    )
                })
                .help("Number of worker threads (default: one per cpu)"),
        )
        .arg(
            Arg::with_name(ITERATIONS)
                .required(false)
                .long(ITERATIONS)
                .short("i")
                .takes_value(true)
                .default_value("500")
                .validator(move |s| {
                    validate_range(
                        &s,
                        1,
                        1_000_000,
                        "Could not parse iteration count",
                        "Iteration count must be between 1 and 1000000",
                    )
                })
                .help("Starting iteration cap"),
        )
        .arg(
            Arg::with_name(CHUNKS)
                .required(false)
                .long(CHUNKS)
                .short("c")
                .takes_value(true)
                .validator(|s| {
                    validate_range(
                        &s,
                        1,
                        u32::max_value(),
                        "Could not parse band count",
                        "Band count must be at least 1",
                    )
                })
                .help("Bands per generation (default: one per five rows)"),
        )
        .arg(
            Arg::with_name(BACKEND)
                .required(false)
                .long(BACKEND)
                .short("b")
                .takes_value(true)
                .possible_values(&["cpu", "offload"])
                .default_value("cpu")
                .help("Compute backend"),
        )
        .arg(
            Arg::with_name(CLICK)
                .required(false)
                .long(CLICK)
                .short("z")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .validator(|s| validate_pair::<f64>(&s, ',', "Could not parse click position"))
                .help("Zoom in on a raster position X,Y; may be repeated"),
        )
        .arg(
            Arg::with_name(MORE)
                .long(MORE)
                .multiple(true)
                .help("Raise the iteration cap by a quarter; may be repeated"),
        )
        .arg(
            Arg::with_name(LESS)
                .long(LESS)
                .multiple(true)
                .help("Lower the iteration cap by a fifth; may be repeated"),
        )
        .arg(
            Arg::with_name(RESET)
                .long(RESET)
                .multiple(true)
                .help("Return to the default view"),
        )
        .arg(
            Arg::with_name(SWITCH)
                .long(SWITCH)
                .multiple(true)
                .help("Switch to the other compute backend"),
        )
        .arg(
            Arg::with_name(SETTLE)
                .long(SETTLE)
                .takes_value(true)
                .default_value("60")
                .validator(|s| {
                    validate_range(
                        &s,
                        1u64,
                        86_400,
                        "Could not parse settle timeout",
                        "Settle timeout must be between 1 and 86400 seconds",
                    )
                })
                .help("Seconds to wait for each view to finish rendering"),
        )
        .get_matches()
}

/// One user input, in command-line order.
enum Input {
    Click(f64, f64),
    More,
    Less,
    Reset,
    Switch,
}

fn inputs(matches: &ArgMatches) -> Vec<Input> {
    let mut inputs: Vec<(usize, Input)> = vec![];
    if let (Some(values), Some(indices)) = (matches.values_of(CLICK), matches.indices_of(CLICK)) {
        for (value, index) in values.zip(indices) {
            if let Some((x, y)) = parse_pair(value, ',') {
                inputs.push((index, Input::Click(x, y)));
            }
        }
    }
    let flags: [(&str, fn() -> Input); 4] = [
        (MORE, || Input::More),
        (LESS, || Input::Less),
        (RESET, || Input::Reset),
        (SWITCH, || Input::Switch),
    ];
    for (name, make) in flags.iter() {
        if let Some(indices) = matches.indices_of(name) {
            inputs.extend(indices.map(|index| (index, make())));
        }
    }
    inputs.sort_by_key(|&(index, _)| index);
    inputs.into_iter().map(|(_, input)| input).collect()
}

fn config(matches: &ArgMatches) -> Result<Config, failure::Error> {
    let (width, height) = parse_pair::<u32>(matches.value_of(SIZE).unwrap_or(""), 'x')
        .ok_or_else(|| failure::err_msg("Error parsing image dimensions"))?;
    let mut config = Config::with_size(width, height);
    if let Some(threads) = matches.value_of(THREADS) {
        config.workers = usize::from_str(threads)?;
    }
    if let Some(chunks) = matches.value_of(CHUNKS) {
        config.chunk_count = u32::from_str(chunks)?;
    }
    if let Some(iterations) = matches.value_of(ITERATIONS) {
        config.iteration_cap = u32::from_str(iterations)?;
    }
    Ok(config)
}

fn write_image(
    outfile: &str,
    pixels: &[u8],
    width: u32,
    height: u32,
) -> Result<(), std::io::Error> {
    let path = Path::new(outfile);
    let output = File::create(&path)?;
    let mut encoder =
        PNMEncoder::new(output).with_subtype(PNMSubtype::Graymap(SampleEncoding::Binary));
    encoder.encode(pixels, width, height, ColorType::Gray(8))?;
    Ok(())
}

fn settle(dispatcher: &mut Dispatcher, timeout: Duration) -> Result<(), failure::Error> {
    if dispatcher.wait_settled(timeout)? {
        Ok(())
    } else {
        Err(failure::format_err!(
            "View did not finish rendering within {} seconds",
            timeout.as_secs()
        ))
    }
}

fn run(matches: &ArgMatches) -> Result<(), failure::Error> {
    let config = config(matches)?;
    let backend = BackendKind::from_str(matches.value_of(BACKEND).unwrap_or("cpu"))
        .map_err(failure::err_msg)?;
    let timeout = Duration::from_secs(u64::from_str(matches.value_of(SETTLE).unwrap_or("60"))?);

    let mut dispatcher = Dispatcher::new(config, backend)?;
    settle(&mut dispatcher, timeout)?;
    for input in inputs(matches) {
        match input {
            Input::Click(x, y) => dispatcher.click(x, y)?,
            Input::More => dispatcher.more_iterations()?,
            Input::Less => dispatcher.fewer_iterations()?,
            Input::Reset => dispatcher.reset()?,
            Input::Switch => {
                dispatcher.switch_backend()?;
            }
        }
        settle(&mut dispatcher, timeout)?;
    }

    // The display convention: the shade lives in the second byte.
    let pixels: Vec<u8> = dispatcher
        .snapshot()
        .iter()
        .map(|&value| (value >> 8) as u8)
        .collect();
    let raster = dispatcher.raster();
    write_image(
        matches.value_of(OUTPUT).unwrap_or("tilebrot.pgm"),
        &pixels,
        raster.width,
        raster.height,
    )?;
    println!("{}", dispatcher.status());
    dispatcher.shutdown();
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let matches = args();
    if let Err(e) = run(&matches) {
        eprintln!("Render failure: {}", e);
        std::process::exit(1);
    }
}

//! Traffic Measurement Data Generator
//!
//! Writes one measurement file per 10-minute interval, named after its
//! timestamp, in the comma (`.csv`) or pipe (`.txt`) layout the ingester
//! reads. A small share of subscribers get traffic spikes so the anomaly
//! queries have something to find.

use chrono::{Duration, NaiveDateTime};
use clap::{Arg, Command};
use rand::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const HEADER: &[&str] = &[
    "IdSession",
    "IdPSX",
    "IdSubscriber",
    "StartSession",
    "EndSession",
    "Duartion",
    "UpTx",
    "DownTx",
];

const SESSION_FORMAT: &str = "%d.%m.%Y %H:%M:%S";
const FILE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

struct Profile {
    subscriber_id: u64,
    node_id: u64,
    mean_up: f64,
    mean_down: f64,
}

fn build_profiles(rng: &mut impl Rng, subscribers: u64, nodes: u64) -> Vec<Profile> {
    (1..=subscribers)
        .map(|subscriber_id| Profile {
            subscriber_id,
            node_id: rng.gen_range(1..=nodes),
            mean_up: rng.gen_range(1_000.0..50_000.0),
            mean_down: rng.gen_range(10_000.0..500_000.0),
        })
        .collect()
}

fn jitter(rng: &mut impl Rng, mean: f64) -> f64 {
    (mean * rng.gen_range(0.7..1.3)).round().max(1.0)
}

#[allow(clippy::too_many_arguments)]
fn write_file(
    path: &Path,
    delimiter: char,
    profiles: &[Profile],
    interval: NaiveDateTime,
    session_base: u64,
    spike_ratio: f64,
    closed_ratio: f64,
    rng: &mut impl Rng,
) -> std::io::Result<usize> {
    let mut writer = BufWriter::new(File::create(path)?);
    let sep = delimiter.to_string();
    writeln!(writer, "{}", HEADER.join(&sep))?;

    let mut written = 0;
    for (i, profile) in profiles.iter().enumerate() {
        let start = interval - Duration::seconds(rng.gen_range(0..3_600));
        let duration = (interval - start).num_seconds();
        let end = if rng.gen_bool(closed_ratio) {
            (start + Duration::seconds(duration / 2))
                .format(SESSION_FORMAT)
                .to_string()
        } else {
            String::new()
        };

        let spike = if rng.gen_bool(spike_ratio) {
            rng.gen_range(10.0..50.0)
        } else {
            1.0
        };
        let up = jitter(rng, profile.mean_up) * spike;
        let down = jitter(rng, profile.mean_down) * spike;

        let fields = [
            (session_base + i as u64).to_string(),
            profile.node_id.to_string(),
            profile.subscriber_id.to_string(),
            start.format(SESSION_FORMAT).to_string(),
            end,
            duration.to_string(),
            format!("{}", up),
            format!("{}", down),
        ];
        writeln!(writer, "{}", fields.join(&sep))?;
        written += 1;
    }

    writer.flush()?;
    Ok(written)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("Traffic Measurement Generator")
        .version("1.0")
        .about("Generates 10-minute traffic measurement files for ingestion benchmarks")
        .arg(Arg::new("output")
            .short('o')
            .long("output")
            .value_name("DIR")
            .help("Output directory")
            .default_value("telecom10k"))
        .arg(Arg::new("start")
            .long("start")
            .value_name("TIMESTAMP")
            .help("First interval (YYYY-MM-DD HH:MM:SS)")
            .default_value("2024-01-01 00:00:00"))
        .arg(Arg::new("intervals")
            .short('n')
            .long("intervals")
            .value_name("NUMBER")
            .help("Number of 10-minute files to write")
            .default_value("12"))
        .arg(Arg::new("subscribers")
            .short('s')
            .long("subscribers")
            .value_name("NUMBER")
            .help("Subscribers per file")
            .default_value("1000"))
        .arg(Arg::new("nodes")
            .long("nodes")
            .value_name("NUMBER")
            .help("Distinct node identifiers")
            .default_value("4"))
        .arg(Arg::new("spike-ratio")
            .long("spike")
            .value_name("RATIO")
            .help("Share of rows with a traffic spike (0.0-1.0)")
            .default_value("0.01"))
        .arg(Arg::new("closed-ratio")
            .long("closed")
            .value_name("RATIO")
            .help("Share of sessions that already ended (0.0-1.0)")
            .default_value("0.1"))
        .arg(Arg::new("pipe")
            .long("pipe")
            .help("Write pipe-separated .txt files instead of .csv")
            .action(clap::ArgAction::SetTrue))
        .get_matches();

    let output = Path::new(
        matches
            .get_one::<String>("output")
            .ok_or("missing output directory")?,
    );
    let start = NaiveDateTime::parse_from_str(
        matches.get_one::<String>("start").ok_or("missing start")?,
        FILE_FORMAT,
    )?;
    let intervals: usize = matches.get_one::<String>("intervals").ok_or("missing intervals")?.parse()?;
    let subscribers: u64 = matches.get_one::<String>("subscribers").ok_or("missing subscribers")?.parse()?;
    let nodes: u64 = matches.get_one::<String>("nodes").ok_or("missing nodes")?.parse()?;
    let spike_ratio: f64 = matches.get_one::<String>("spike-ratio").ok_or("missing spike ratio")?.parse()?;
    let closed_ratio: f64 = matches.get_one::<String>("closed-ratio").ok_or("missing closed ratio")?.parse()?;
    let pipe = matches.get_flag("pipe");

    if !(0.0..=1.0).contains(&spike_ratio) || !(0.0..=1.0).contains(&closed_ratio) {
        return Err("ratios must lie in 0.0-1.0".into());
    }

    std::fs::create_dir_all(output)?;
    let (delimiter, extension) = if pipe { ('|', "txt") } else { (',', "csv") };

    let mut rng = thread_rng();
    let profiles = build_profiles(&mut rng, subscribers, nodes.max(1));

    println!(
        "Generating {} files of {} subscribers in {}...",
        intervals,
        subscribers,
        output.display()
    );

    let mut total = 0;
    for i in 0..intervals {
        let interval = start + Duration::minutes(10 * i as i64);
        let path = output.join(format!("{}.{}", interval.format(FILE_FORMAT), extension));
        total += write_file(
            &path,
            delimiter,
            &profiles,
            interval,
            (i as u64) * subscribers,
            spike_ratio,
            closed_ratio,
            &mut rng,
        )?;
    }

    println!("Generated {} rows in {}", total, output.display());
    Ok(())
}

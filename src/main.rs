use anyhow;
use clap;

use hprof_retained::analyzer::HeapDumpAnalyzer;
use hprof_retained::report;
use itertools::Itertools;
use log::{info, warn};
use std::path::Path;
use std::time::Instant;

fn main() -> Result<(), anyhow::Error> {
    let matches = clap::App::new("hprof-retained")
        .about("Reports the retained size of every class in a JVM hprof heap dump")
        .arg(
            clap::Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Verbose logging: -v for debug, -vv for trace"),
        )
        .arg(
            clap::Arg::with_name("root")
                .long("root")
                .help("Run ingest and root reachability only, then exit"),
        )
        .arg(
            clap::Arg::with_name("target")
                .long("target")
                .takes_value(true)
                .value_name("CLASS")
                .help("Analyze only instances of this class and print their retained sizes"),
        )
        .arg(
            clap::Arg::with_name("rlimit")
                .long("rlimit")
                .takes_value(true)
                .value_name("SIZE")
                .default_value("4GB")
                .help("Virtual address space limit, human-suffixed (e.g. 4GB)"),
        )
        .arg(
            clap::Arg::with_name("cpuprofile")
                .long("cpuprofile")
                .takes_value(true)
                .value_name("PATH")
                .help("Where external tooling should write a cpu profile"),
        )
        .arg(
            clap::Arg::with_name("memprofile")
                .long("memprofile")
                .takes_value(true)
                .value_name("PATH")
                .help("Where external tooling should write a memory profile"),
        )
        .arg(
            clap::Arg::with_name("file")
                .required(true)
                .value_name("FILE")
                .help("Heap dump file to read"),
        )
        .get_matches();

    let level = match matches.occurrences_of("v") {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .target(env_logger::Target::Stdout)
        .init();

    let rlimit = matches
        .value_of("rlimit")
        .expect("rlimit has a default")
        .parse::<bytesize::ByteSize>()
        .map_err(anyhow::Error::msg)?;
    set_address_space_limit(rlimit.as_u64())?;

    if matches.is_present("cpuprofile") || matches.is_present("memprofile") {
        warn!("profiling is delegated to external tooling; --cpuprofile/--memprofile are ignored");
    }

    let heap_file_path = Path::new(matches.value_of("file").expect("file is required"));

    let mut analyzer = {
        let start = Instant::now();
        let analyzer = HeapDumpAnalyzer::read_file(heap_file_path)?;
        info!("Read heap dump file in {:?}.", start.elapsed());
        analyzer
    };

    let root_scanner = {
        let start = Instant::now();
        let scanner = analyzer.scan_roots()?;
        info!("Scanned retained root in {:?}.", start.elapsed());
        scanner
    };

    if matches.is_present("root") {
        return Ok(());
    }

    match matches.value_of("target") {
        Some(target_class) => {
            let sizes = analyzer.retained_sizes_by_class_name(&root_scanner, target_class)?;
            if sizes.is_empty() {
                warn!("no instances of {} found", target_class);
            }
            for (object_id, size) in sizes.iter().sorted_by_key(|(object_id, _)| **object_id) {
                info!("{}={}", object_id, size);
            }
        }
        None => {
            let start = Instant::now();
            let rows = analyzer.ranking_by_class(&root_scanner)?;
            report::dump_inclusive_ranking(&rows);
            info!("Calculated inclusive heap size in {:?}.", start.elapsed());
        }
    }

    Ok(())
}

#[cfg(unix)]
fn set_address_space_limit(bytes: u64) -> Result<(), anyhow::Error> {
    let limit = libc::rlimit {
        rlim_cur: bytes as libc::rlim_t,
        rlim_max: bytes as libc::rlim_t,
    };

    let ret = unsafe { libc::setrlimit(libc::RLIMIT_AS, &limit) };
    if ret != 0 {
        return Err(anyhow::Error::from(std::io::Error::last_os_error()));
    }

    Ok(())
}

#[cfg(not(unix))]
fn set_address_space_limit(_bytes: u64) -> Result<(), anyhow::Error> {
    log::warn!("address space limits are not supported on this platform");
    Ok(())
}

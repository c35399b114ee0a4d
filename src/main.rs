use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use seq_file::buffer::DataBuffer;
use seq_file::compare::{BytesComparator, Reversed};
use seq_file::record::Bytes;
use seq_file::{RawComparator, Reader, Registry, Result, SeqFileError, SorterBuilder, Writable, Writer};

const MAX_KEY_LEN: usize = 32;
const MAX_VALUE_LEN: usize = 64;

struct Config {
    count: usize,
    memory: usize,
    factor: usize,
    seed: Option<u64>,
    check: bool,
    merge: bool,
}

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let file = PathBuf::from(arg_parser.value_of("file").expect("value is required"));

    if arg_parser.is_present("dump") {
        if let Err(err) = dump(&file) {
            log::error!("file dumping error: {}", err);
            process::exit(1);
        }
        return;
    }

    let memory = arg_parser.value_of("memory").expect("value is required");
    let config = Config {
        count: arg_parser.value_of_t_or_exit("count"),
        memory: memory.parse::<ByteSize>().expect("value is pre-validated").as_u64() as usize,
        factor: arg_parser.value_of_t_or_exit("factor"),
        seed: arg_parser
            .is_present("seed")
            .then(|| arg_parser.value_of_t_or_exit("seed")),
        check: arg_parser.is_present("check"),
        merge: arg_parser.is_present("merge"),
    };

    let order: Order = arg_parser.value_of_t_or_exit("sort");
    let result = match order {
        Order::Asc => run(&file, &config, BytesComparator),
        Order::Desc => run(&file, &config, Reversed(BytesComparator)),
    };

    if let Err(err) = result {
        log::error!("self-test error: {}", err);
        process::exit(1);
    }
}

fn run<C: RawComparator>(file: &Path, config: &Config, comparator: C) -> Result<()> {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let records = generate(&mut rng, config.count);
    write_records(file, &records)?;
    log::info!("generated {} records into {}", records.len(), file.display());

    if config.check {
        check(file, &records)?;
        log::info!("read back {} records", records.len());
    }

    let type_name = Bytes::default().type_name();
    let sorter = SorterBuilder::new(type_name, type_name, comparator)
        .with_memory(config.memory)
        .with_factor(config.factor)
        .build();
    let output = with_suffix(file, "sorted");

    if config.merge {
        let mut parts = Vec::with_capacity(sorter.factor());
        for idx in 0..sorter.factor() {
            let part = with_suffix(file, &format!("part{}", idx));
            let chunk = Vec::from_iter(records.iter().skip(idx).step_by(sorter.factor()).cloned());
            write_records(&part, &chunk)?;

            let sorted = with_suffix(&part, "sorted");
            sorter.sort(&part, &sorted)?;
            fs::remove_file(&part)?;
            parts.push(sorted);
        }

        sorter.merge(&parts, &output)?;
        for part in &parts {
            fs::remove_file(part)?;
        }
    } else {
        let report = sorter.sort(file, &output)?;
        log::info!(
            "sorted into {} segments with {} merge passes",
            report.segments,
            report.merge_passes
        );
    }

    verify(&output, records.len(), sorter.comparator())?;
    log::info!("{} is sorted", output.display());

    return Ok(());
}

fn generate(rng: &mut StdRng, count: usize) -> Vec<(Bytes, Bytes)> {
    let mut random_bytes = |min_len: usize, max_len: usize| {
        let mut data = vec![0u8; rng.gen_range(min_len..=max_len)];
        rng.fill(&mut data[..]);
        Bytes(data)
    };

    Vec::from_iter((0..count).map(|_| (random_bytes(1, MAX_KEY_LEN), random_bytes(0, MAX_VALUE_LEN))))
}

fn write_records(path: &Path, records: &[(Bytes, Bytes)]) -> Result<()> {
    let mut writer = Writer::create_for::<Bytes, Bytes>(path)?;
    for (key, value) in records {
        writer.append(key, value)?;
    }
    writer.close()
}

fn check(path: &Path, records: &[(Bytes, Bytes)]) -> Result<()> {
    let mut reader = Reader::open(path)?;
    let (mut key, mut value) = (Bytes::default(), Bytes::default());

    for (idx, (expected_key, expected_value)) in records.iter().enumerate() {
        if !reader.next(&mut key, &mut value)? {
            return Err(SeqFileError::CorruptRecord(format!("record {} is missing", idx)));
        }
        if &key != expected_key || &value != expected_value {
            return Err(SeqFileError::CorruptRecord(format!("record {} differs", idx)));
        }
    }
    if reader.next(&mut key, &mut value)? {
        return Err(SeqFileError::CorruptRecord(format!("more than {} records", records.len())));
    }

    return Ok(());
}

fn verify<C: RawComparator>(path: &Path, expected: usize, comparator: &C) -> Result<()> {
    let mut reader = Reader::open(path)?;
    let mut previous = DataBuffer::new();
    let mut previous_key_len = 0;
    let mut current = DataBuffer::new();
    let mut count = 0;

    while let Some(key_len) = reader.next_raw(&mut current)? {
        if count > 0 {
            let ordering = comparator.compare(&previous.data()[..previous_key_len], &current.data()[..key_len])?;
            if ordering == Ordering::Greater {
                return Err(SeqFileError::CorruptRecord(format!("record {} is out of order", count)));
            }
        }

        std::mem::swap(&mut previous, &mut current);
        current.reset();
        previous_key_len = key_len;
        count += 1;
    }

    if count != expected {
        return Err(SeqFileError::CorruptRecord(format!(
            "expected {} records, found {}",
            expected, count
        )));
    }

    return Ok(());
}

fn dump(path: &Path) -> Result<()> {
    let registry = Registry::with_builtins();
    let mut reader = Reader::open(path)?;
    reader.resolve_types(&registry);

    let mut key = reader.new_key(&registry)?;
    let mut value = reader.new_value(&registry)?;
    log::info!("{}: {} -> {}", path.display(), reader.key_type(), reader.value_type());

    while reader.next(&mut *key, &mut *value)? {
        println!("{:?}\t{:?}", key, value);
    }

    return Ok(());
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}", suffix));
    PathBuf::from(name)
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum Order {
    Asc,
    Desc,
}

impl Order {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Order::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for Order {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        <Order as clap::ArgEnum>::from_str(s, false)
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("seq-file")
        .about("sequence file sort/merge self-test")
        .arg(
            clap::Arg::new("file")
                .help("sequence file to be generated, or dumped with --dump")
                .required(true)
                .index(1),
        )
        .arg(
            clap::Arg::new("count")
                .short('n')
                .long("count")
                .help("number of records to generate")
                .takes_value(true)
                .default_value("100000"),
        )
        .arg(
            clap::Arg::new("memory")
                .short('m')
                .long("memory")
                .help("sort memory budget")
                .takes_value(true)
                .default_value("8MB")
                .validator(|v| match v.parse::<ByteSize>() {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Memory size format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("factor")
                .short('f')
                .long("factor")
                .help("number of segments merged at once")
                .takes_value(true)
                .default_value("100"),
        )
        .arg(
            clap::Arg::new("seed")
                .long("seed")
                .help("random generator seed")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("sort")
                .short('s')
                .long("sort")
                .help("sorting order")
                .takes_value(true)
                .default_value("asc")
                .possible_values(Order::possible_values()),
        )
        .arg(clap::Arg::new("check").long("check").help("read the generated file back"))
        .arg(
            clap::Arg::new("merge")
                .long("merge")
                .help("sort `factor` parts of the file separately and merge them"),
        )
        .arg(
            clap::Arg::new("dump")
                .long("dump")
                .help("print the records of an existing file"),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rvvsim::config::{VectorConfig, DEFAULT_VLEN};
use rvvsim::script::Session;
use rvvsim::vector::{Lmul, Sew, Vtype};
use rvvsim::{Ram, VectorUnit};

#[derive(Parser)]
#[command(
    name = "rvvsim",
    version,
    about = "RISC-V vector extension engine driven by instruction scripts"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a vector instruction script
    Run {
        /// Path to the script
        script: PathBuf,

        /// Vector register width in bits
        #[arg(long, default_value_t = DEFAULT_VLEN)]
        vlen: usize,

        /// Base address of the simulated RAM (hex or decimal)
        #[arg(long, default_value = "0x1000")]
        base: String,

        /// RAM size in KiB
        #[arg(short, long, default_value = "64")]
        memory: usize,

        /// Log every element the engine touches
        #[arg(long)]
        trace: bool,
    },
    /// Print VLMAX for every SEW/LMUL pair
    Vlmax {
        /// Vector register width in bits
        #[arg(long, default_value_t = DEFAULT_VLEN)]
        vlen: usize,
    },
}

struct RunConfig {
    script: PathBuf,
    vlen: usize,
    ram_base: u64,
    ram_size: usize,
}

fn parse_addr(text: &str) -> Option<u64> {
    match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

fn run(config: RunConfig) -> Result<(), String> {
    let source = std::fs::read_to_string(&config.script)
        .map_err(|e| format!("{}: {e}", config.script.display()))?;
    let vector = VectorConfig::new(config.vlen).map_err(|e| e.to_string())?;
    log::info!(
        "rvvsim: VLEN={} RAM {:#x}+{:#x}",
        vector.vlen(),
        config.ram_base,
        config.ram_size
    );
    let unit = VectorUnit::new(vector);
    let ram = Ram::new(config.ram_base, config.ram_size);
    let mut session = Session::new(unit, ram, std::io::stdout().lock());
    session
        .run(&source)
        .map_err(|e| format!("{}: {e}", config.script.display()))
}

fn print_vlmax(vlen: usize) -> Result<(), String> {
    let config = VectorConfig::new(vlen).map_err(|e| e.to_string())?;
    print!("{:>6}", "");
    for lmul in Lmul::ALL {
        print!("{:>6}", lmul.to_string());
    }
    println!();
    for sew in Sew::ALL {
        print!("{:>6}", sew.to_string());
        for lmul in Lmul::ALL {
            let vtype = Vtype::new(sew, lmul);
            if vtype.vill {
                print!("{:>6}", "-");
            } else {
                print!("{:>6}", vtype.vlmax(config.vlen()));
            }
        }
        println!();
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            script,
            vlen,
            base,
            memory,
            trace,
        } => {
            let mut logger = env_logger::Builder::from_default_env();
            if trace {
                logger.filter_module("rvvsim", log::LevelFilter::Trace);
            }
            logger.init();
            match parse_addr(&base) {
                Some(ram_base) => run(RunConfig {
                    script,
                    vlen,
                    ram_base,
                    ram_size: memory * 1024,
                }),
                None => Err(format!("invalid RAM base `{base}`")),
            }
        }
        Commands::Vlmax { vlen } => {
            env_logger::init();
            print_vlmax(vlen)
        }
    };

    if let Err(e) = result {
        log::error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

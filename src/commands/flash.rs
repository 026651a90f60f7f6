//! Flash command implementation

use crate::commands::run_repl;
use crate::config::Config;
use crate::progress::IndicatifProgress;
use crate::transports;
use colored::Colorize;
use mpdev_core::{Endpoint, Transport};
use mpdev_flash::{
    find_latest_firmware, plan_operations, FlashJob, FlashMachine, FlashOptions, FlashResult,
};
use std::path::PathBuf;

/// Arguments of `mpdev flash`
pub struct FlashArgs {
    pub endpoint: Endpoint,
    pub firmware: Option<PathBuf>,
    pub firmware_dir: Option<PathBuf>,
    pub erase: bool,
    pub verify: bool,
    pub baud: Option<u32>,
    pub chip: Option<String>,
    pub ota_chunk_size: Option<usize>,
    pub dry_run: bool,
    pub open_repl: bool,
}

/// Flash one image
pub async fn run_flash(config: &Config, args: FlashArgs) -> Result<(), Box<dyn std::error::Error>> {
    let firmware = resolve_firmware(&args)?;
    let job = build_job(config, &args, firmware);

    if args.dry_run {
        for op in plan_operations(&job) {
            println!("{} {}", config.flash_tool, op.args().join(" "));
        }
        return Ok(());
    }

    println!(
        "Flashing {} to {} ({})",
        job.firmware.display(),
        job.endpoint,
        if job.connection().is_ota() { "over the air" } else { "serial" }
    );

    let mut transport = transports::open_flash(&job.endpoint, config);
    let options = FlashOptions {
        settle: config.settle(),
        ..Default::default()
    };
    let mut progress = IndicatifProgress::new();

    let outcome = FlashMachine::new(&mut transport, options)
        .run(&job, &mut progress)
        .await;
    let result = match outcome {
        Ok(result) => {
            progress.finish("Firmware written");
            result
        }
        Err(failure) => {
            progress.clear();
            return Err(failure.into());
        }
    };
    print_result(&result);

    if args.open_repl && transport.supports_session() {
        run_repl(config, transport.endpoint(), true).await?;
    }
    Ok(())
}

fn resolve_firmware(args: &FlashArgs) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(path) = &args.firmware {
        return Ok(path.clone());
    }
    let dir = args
        .firmware_dir
        .as_deref()
        .ok_or("either --firmware or --firmware-dir is required")?;
    match find_latest_firmware(dir)? {
        Some(path) => {
            log::info!("Using newest firmware {}", path.display());
            Ok(path)
        }
        None => Err(format!("no .bin firmware found in {}", dir.display()).into()),
    }
}

fn build_job(config: &Config, args: &FlashArgs, firmware: PathBuf) -> FlashJob {
    let mut job = FlashJob::new(args.endpoint.clone(), firmware);
    job.baud = args.baud.unwrap_or(config.baud);
    job.chip = args.chip.clone().unwrap_or_else(|| config.chip.clone());
    job.ota_chunk_size = args.ota_chunk_size.unwrap_or(config.ota_chunk_size);
    job.erase_first = args.erase;
    job.verify = args.verify;
    job
}

fn print_result(result: &FlashResult) {
    println!(
        "{} {} in {:.1}s",
        "Flashed".bright_green().bold(),
        result.endpoint,
        result.elapsed.as_secs_f32()
    );
    if let Some(chip) = &result.chip {
        println!("Chip:            {}", chip);
    }
    if let Some(mac) = &result.mac {
        println!("MAC:             {}", mac);
    }
    println!("Erased:          {}", if result.erased { "yes" } else { "no" });
    println!("Verified:        {}", if result.verified { "yes" } else { "no" });
    if result.write_attempts > 1 {
        println!("Write attempts:  {}", result.write_attempts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(endpoint: &str) -> FlashArgs {
        FlashArgs {
            endpoint: Endpoint::parse(endpoint).unwrap(),
            firmware: Some(PathBuf::from("fw.bin")),
            firmware_dir: None,
            erase: false,
            verify: false,
            baud: None,
            chip: Some("esp32".to_string()),
            ota_chunk_size: None,
            dry_run: true,
            open_repl: false,
        }
    }

    #[test]
    fn test_cli_overrides_config() {
        let config = Config::default();
        let job = build_job(&config, &args("/dev/ttyUSB0"), PathBuf::from("fw.bin"));
        assert_eq!(job.chip, "esp32");
        assert_eq!(job.baud, config.baud);
        assert_eq!(job.ota_chunk_size, config.ota_chunk_size);
    }

    #[test]
    fn test_firmware_dir_picks_bin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("build.bin"), b"fw").unwrap();
        let mut a = args("/dev/ttyUSB0");
        a.firmware = None;
        a.firmware_dir = Some(dir.path().to_path_buf());
        assert_eq!(resolve_firmware(&a).unwrap(), dir.path().join("build.bin"));

        let empty = tempfile::tempdir().unwrap();
        a.firmware_dir = Some(empty.path().to_path_buf());
        assert!(resolve_firmware(&a).is_err());
    }
}

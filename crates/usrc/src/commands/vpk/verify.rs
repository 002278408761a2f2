use clap::Args;
use miette::{miette, Context, Result};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use tracing::{debug, error};
use usrc_vpk::{error::Error, VpkArchive};

#[derive(Args)]
pub struct VerifyArgs {
    /// An input VPK directory file (`*_dir.vpk`)
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,
}

impl VerifyArgs {
    pub fn handle(&self) -> Result<()> {
        let mut vpk =
            VpkArchive::open(&self.file).context(format!("path: {}", self.file.display()))?;

        let paths: Vec<String> = vpk.list_paths().map(str::to_owned).collect();
        let mut failed = 0usize;

        for path in &paths {
            match vpk.get_bytes_verified(path) {
                Ok(data) => debug!("{path}: {} bytes ok", data.len()),
                Err(e) => {
                    error!("{path}: {e}");
                    failed += 1;
                }
            }
        }

        let archive = match vpk.verify_checksums() {
            Ok(()) => "ok".green().to_string(),
            Err(Error::Unsupported(reason)) => format!("{} ({reason})", "skipped".yellow()),
            Err(e) => {
                error!("{e}");
                failed += 1;
                "failed".red().to_string()
            }
        };

        let summary = if failed == 0 {
            "ok".green().to_string()
        } else {
            format!("{failed} failed").red().to_string()
        };
        println!(
            "{}: {} entries, {summary}, archive checksums {archive}",
            self.file.display().bold(),
            paths.len()
        );

        vpk.close();
        if failed > 0 {
            return Err(miette!("{failed} checks failed in {}", self.file.display()));
        }
        Ok(())
    }
}

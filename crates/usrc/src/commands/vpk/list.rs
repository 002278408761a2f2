use clap::Args;
use itertools::Itertools;
use miette::{Context, IntoDiagnostic, Result};
use owo_colors::OwoColorize;
use std::{io::Write, path::PathBuf};
use usrc_vpk::{VpkArchive, VpkEntry};

#[derive(Args)]
pub struct ListArgs {
    /// An input VPK directory file (`*_dir.vpk`)
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// Only list entries below this folder
    #[arg(short, long)]
    prefix: Option<String>,

    /// Only list entries with this extension
    #[arg(short, long)]
    extension: Option<String>,
}

impl ListArgs {
    fn matches(&self, entry: &VpkEntry) -> bool {
        let extension = self.extension.as_deref().map(|e| e.trim_start_matches('.'));
        extension.map_or(true, |e| entry.extension().eq_ignore_ascii_case(e))
    }

    pub fn handle(&self) -> Result<()> {
        let vpk = VpkArchive::open(&self.file).context(format!("path: {}", self.file.display()))?;

        let entries = self.prefix.as_deref().map_or_else(
            || vpk.entries().iter().collect_vec(),
            |prefix| vpk.entries().with_prefix(prefix).collect_vec(),
        );

        let mut out = std::io::stdout().lock();
        for entry in entries
            .into_iter()
            .filter(|e| self.matches(e))
            .sorted_by(|a, b| a.path.cmp(&b.path))
        {
            writeln!(
                out,
                "{}\t{}\t{}",
                entry.path,
                entry.len(),
                entry.archive_index.dimmed()
            )
            .into_diagnostic()?;
        }
        Ok(())
    }
}

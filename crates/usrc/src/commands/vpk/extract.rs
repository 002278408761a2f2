use clap::Args;
use miette::{Context, IntoDiagnostic, Result};
use std::{
    fs::File,
    io::Write,
    path::{Component, Path, PathBuf},
};
use tracing::{info, warn};
use usrc_vpk::VpkArchive;

#[derive(Args)]
pub struct ExtractArgs {
    /// An input VPK directory file (`*_dir.vpk`)
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// Only extract entries below this folder
    #[arg(short, long)]
    prefix: Option<String>,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

/// Whether `path` stays inside the directory it is joined to
fn is_contained(path: &Path) -> bool {
    path.components().all(|c| matches!(c, Component::Normal(_)))
}

impl ExtractArgs {
    pub fn handle(&self) -> Result<()> {
        let mut vpk =
            VpkArchive::open(&self.file).context(format!("path: {}", self.file.display()))?;

        let paths: Vec<String> = match self.prefix.as_deref() {
            Some(prefix) => vpk
                .entries()
                .with_prefix(prefix)
                .map(|e| e.path.to_string())
                .collect(),
            None => vpk.list_paths().map(str::to_owned).collect(),
        };

        for name in paths {
            if !is_contained(Path::new(&name)) {
                warn!("skipping {name}, it would be written outside of the target");
                continue;
            }

            let p = self.directory.join(&name);
            info!("writing {}", p.display());

            let data = vpk.get_bytes(&name)?;

            if let Some(parent) = p.parent() {
                std::fs::create_dir_all(parent)
                    .into_diagnostic()
                    .context(format!("creating {}", parent.display()))?;
            }
            let mut out = if !self.overwrite {
                File::create_new(&p)
                    .into_diagnostic()
                    .context(format!("creating {}", &p.display()))?
            } else {
                File::create(&p)
                    .into_diagnostic()
                    .context(format!("creating {}", &p.display()))?
            };

            out.write_all(&data).into_diagnostic()?;
        }

        vpk.close();
        Ok(())
    }
}

pub mod extract;
pub mod list;
pub mod verify;

#[derive(clap::Subcommand)]
pub enum VpkCommands {
    /// List the entries of a VPK file
    List(list::ListArgs),
    /// Extract a VPK file into a directory
    Extract(extract::ExtractArgs),
    /// Check the checksums of a VPK file
    Verify(verify::VerifyArgs),
}

impl VpkCommands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            VpkCommands::List(list) => list.handle(),
            VpkCommands::Extract(extract) => extract.handle(),
            VpkCommands::Verify(verify) => verify.handle(),
        }
    }
}

use std::path::PathBuf;

use crate::commands::Command;
use crate::shotgrid_api::ShotgridCredentials;
use clap::Parser;
use secrecy::SecretString;

#[derive(Debug, Parser)]
#[clap(about = env!("CARGO_PKG_DESCRIPTION"), version)]
pub struct Options {
    #[command(flatten)]
    pub global: Global,

    /// Without a subcommand, every version attachment of every asset in the
    /// project is downloaded into the download directory.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Parser)]
pub struct Global {
    /// The ShotGrid site to talk to.
    #[clap(
        long,
        global(true),
        env("SHOTGRID_SERVER_URL"),
        default_value = "https://huise.shotgrid.autodesk.com/"
    )]
    pub server_url: String,

    /// The name of the API script the key below belongs to.
    #[clap(
        long,
        global(true),
        env("SHOTGRID_SCRIPT_NAME"),
        default_value = "project_manager"
    )]
    pub script_name: String,

    /// The application key of the API script. If not specified, it is read
    /// from the environment variable 'SHOTGRID_API_KEY'.
    #[clap(long, global(true), env("SHOTGRID_API_KEY"), hide_env_values(true))]
    pub api_key: Option<SecretString>,

    /// The project every asset and version lives in.
    #[clap(long, global(true), env("SHOTGRID_PROJECT"), default_value = "huise")]
    pub project: String,

    /// Where downloaded attachments are written.
    #[clap(
        long,
        global(true),
        env("SHOTGRID_DOWNLOAD_DIR"),
        default_value = "downloads"
    )]
    pub download_dir: PathBuf,

    /// Scratch directory for files staged before upload.
    #[clap(long, global(true), env("SHOTGRID_TEMP_DIR"), default_value = "temp")]
    pub temp_dir: PathBuf,

    /// Sets verbosity level. Can be specified multiple times to increase the verbosity
    /// of this program.
    #[clap(long = "verbose", short, global(true), action(clap::ArgAction::Count))]
    pub verbosity: u8,
}

impl Global {
    pub fn credentials(&self) -> ShotgridCredentials {
        ShotgridCredentials {
            server_url: self.server_url.clone(),
            script_name: self.script_name.clone(),
            api_key: self.api_key.clone(),
        }
    }
}

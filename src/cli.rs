use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "h5p", version, about = "Manage installed H5P content-type libraries", long_about = None)]
pub struct Args {
    /// Configuration file (TOML, YAML or JSON, chosen by extension)
    #[arg(short, long, global = true, env = "H5P_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Install or patch the library unpacked in a directory
    Install {
        /// Directory containing `library.json` at its root
        directory: PathBuf,
        /// Only allow privileged authors to use the library
        #[arg(long)]
        restricted: bool,
    },
    /// List installed libraries
    List {
        /// Only list libraries with these machine names
        machine_names: Vec<String>,
    },
    /// Print the stored metadata of an installed library
    Show {
        /// Library, as `H5P.Example-1.0` or `H5P.Example-1.0.2`
        library: String,
    },
    /// List the translations shipped with an installed library
    Languages {
        /// Library, as `H5P.Example-1.0` or `H5P.Example-1.0.2`
        library: String,
    },
    /// Check whether a library version would upgrade the installed ones
    UpgradeCheck {
        /// Candidate version, as `H5P.Example-1.0.2`
        library: String,
    },
    /// Remove an installed library and all of its files
    Uninstall {
        /// Library, as `H5P.Example-1.0`
        library: String,
    },
    /// Inspect or change the H5P settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Print every setting
    List,
    /// Print one setting
    Get { key: String },
    /// Change one setting
    Set { key: String, value: String },
}

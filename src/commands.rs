use crate::cli::{Command, SettingsCommand};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use h5p_config::{Config, JsonFileStore, SettingKey, SettingValue};
use h5p_library::LibraryManager;
use h5p_metadata::Library;
use h5p_storage::backend::FileStorage;
use std::path::Path;
use std::sync::Arc;

/// Everything a command needs, built once from the configuration.
pub struct Context {
    pub config: Config,
    pub store: JsonFileStore,
    pub manager: LibraryManager,
}

impl Context {
    pub async fn new(config_file: Option<&Path>) -> Result<Self> {
        let config = Config::load(config_file).or_raise(|| ErrorKind::Config)?;
        let store = JsonFileStore::new(&config.settings_path);
        let config = config.with_stored_settings(&store).await.or_raise(|| ErrorKind::Config)?;
        let root = std::path::absolute(&config.libraries_path).or_raise(|| ErrorKind::Storage)?;
        let storage = FileStorage::new("local", root).or_raise(|| ErrorKind::Storage)?;
        Ok(Self { config, store, manager: LibraryManager::new(Arc::new(storage)) })
    }
}

fn parse_library(input: &str) -> Result<Library> {
    input.parse::<Library>().or_raise(|| ErrorKind::InvalidArgument(input.to_string()))
}

fn parse_key(input: &str) -> Result<SettingKey> {
    input.parse::<SettingKey>().or_raise(|| ErrorKind::InvalidArgument(input.to_string()))
}

pub async fn run(ctx: Context, command: Command) -> Result<()> {
    tracing::debug!(?command, libraries = %ctx.config.libraries_path.display(), "Running command");
    let manager = &ctx.manager;
    match command {
        Command::Install { directory, restricted } => {
            let installed = manager.install_from_directory(&directory, restricted).await.or_raise(|| ErrorKind::Library)?;
            println!("{}", if installed { "installed" } else { "already installed; skipped" });
        },
        Command::List { machine_names } => {
            let names: Vec<&str> = machine_names.iter().map(String::as_str).collect();
            let installed = manager.get_installed(&names).await.or_raise(|| ErrorKind::Library)?;
            for record in installed.values().flatten() {
                let mut flags = Vec::new();
                if record.runnable {
                    flags.push("runnable");
                }
                if record.restricted {
                    flags.push("restricted");
                }
                println!("{:>5}  {:<40} {} {}", record.id, record.library.to_string(), record.title, flags.join(","));
            }
        },
        Command::Show { library } => {
            let library = parse_library(&library)?;
            match manager.read_library(&library).await.or_raise(|| ErrorKind::Library)? {
                Some(loaded) => {
                    let json = loaded.to_vec().or_raise(|| ErrorKind::Library)?;
                    println!("id: {}", loaded.id);
                    println!("{}", String::from_utf8_lossy(&json));
                },
                None => println!("{} is not installed", library.ubername()),
            }
        },
        Command::Languages { library } => {
            let library = parse_library(&library)?;
            for code in manager.list_languages(&library).await {
                println!("{code}");
            }
        },
        Command::UpgradeCheck { library } => {
            let library = parse_library(&library)?;
            let upgrade = manager.library_has_upgrade(&library).await.or_raise(|| ErrorKind::Library)?;
            println!("{}", if upgrade { "upgrade available" } else { "no upgrade" });
        },
        Command::Uninstall { library } => {
            let library = parse_library(&library)?;
            let removed = manager.uninstall_library(&library).await.or_raise(|| ErrorKind::Library)?;
            println!("{}", if removed { "uninstalled" } else { "not installed" });
        },
        Command::Settings { command } => settings(&ctx, command).await?,
    }
    Ok(())
}

async fn settings(ctx: &Context, command: SettingsCommand) -> Result<()> {
    match command {
        SettingsCommand::List => {
            for key in SettingKey::ALL {
                println!("{key} = {}", ctx.config.settings.get(key));
            }
        },
        SettingsCommand::Get { key } => println!("{}", ctx.config.settings.get(parse_key(&key)?)),
        SettingsCommand::Set { key, value } => {
            let key = parse_key(&key)?;
            let value = SettingValue::parse(key, &value).or_raise(|| ErrorKind::InvalidArgument(value.clone()))?;
            let updated = ctx.config.update(key, value, &ctx.store).await.or_raise(|| ErrorKind::Config)?;
            println!("{key} = {}", updated.settings.get(key));
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("H5P.Test-1.0.2")]
    #[case("H5P.Test 1.0.2")]
    #[case("H5P.Test-1.0")]
    fn test_parse_library(#[case] input: &str) {
        assert_eq!(parse_library(input).unwrap().machine_name(), "H5P.Test");
    }

    #[test]
    fn test_parse_invalid_arguments() {
        assert!(matches!(&*parse_library("H5P.Test").unwrap_err(), ErrorKind::InvalidArgument(_)));
        assert!(matches!(&*parse_key("nope").unwrap_err(), ErrorKind::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_context_from_config_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_file = temp_dir.path().join("h5p.toml");
        let libraries = temp_dir.path().join("libraries");
        let settings = temp_dir.path().join("settings.json");
        std::fs::write(
            &config_file,
            format!("libraries_path = {:?}\nsettings_path = {:?}\n", libraries.display().to_string(), settings.display().to_string()),
        )
        .unwrap();
        let ctx = Context::new(Some(&config_file)).await.unwrap();
        assert!(libraries.is_dir());
        settings_set(&ctx).await;
        assert!(settings.is_file());
    }

    async fn settings_set(ctx: &Context) {
        let command = SettingsCommand::Set { key: "fetchingDisabled".to_string(), value: "true".to_string() };
        settings(ctx, command).await.unwrap();
    }
}

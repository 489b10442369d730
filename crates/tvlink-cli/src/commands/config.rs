//! Settings commands implementation.

use tvlink_core::CastConfig;

use super::Context;
use crate::cli::{ConfigArgs, ConfigCommands};
use crate::error::CliError;
use crate::output::get_formatter;

/// Run the config command
pub async fn run_config(args: ConfigArgs, ctx: Context) -> Result<(), CliError> {
    let formatter = get_formatter(ctx.json);

    match args.command {
        ConfigCommands::Show => {
            println!("{}", formatter.format_settings(&ctx.config, ctx.storage.path()));
        }
        ConfigCommands::Init(init) => {
            if ctx.storage.exists() && !init.force {
                return Err(CliError::InvalidArgument(format!(
                    "{} already exists (use --force to overwrite)",
                    ctx.storage.path().display()
                )));
            }

            ctx.storage.save(&CastConfig::default()).await?;
            println!(
                "{}",
                formatter.format_message(&format!(
                    "Wrote default settings to {}",
                    ctx.storage.path().display()
                ))
            );
        }
        ConfigCommands::Path => {
            println!("{}", ctx.storage.path().display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ConfigInitArgs;
    use tvlink_core::SettingsStorage;

    fn context(dir: &tempfile::TempDir) -> Context {
        Context {
            config: CastConfig::default(),
            storage: SettingsStorage::new(dir.path().join("settings.json")),
            json: true,
        }
    }

    fn init(force: bool) -> ConfigArgs {
        ConfigArgs {
            command: ConfigCommands::Init(ConfigInitArgs { force }),
        }
    }

    #[tokio::test]
    async fn test_init_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();

        run_config(init(false), context(&dir)).await.unwrap();
        assert!(dir.path().join("settings.json").exists());

        assert!(matches!(
            run_config(init(false), context(&dir)).await,
            Err(CliError::InvalidArgument(_))
        ));
        run_config(init(true), context(&dir)).await.unwrap();
    }
}

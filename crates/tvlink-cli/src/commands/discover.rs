//! Discover command implementation.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use colored::*;
use tracing::debug;
use tvlink_core::config::DiscoveryConfig;
use tvlink_core::{Device, DeviceRegistry, DiscoveryService, DiscoveryStrategy, DiscoveryTransport};

use super::{spinner, Context};
use crate::cli::DiscoverArgs;
use crate::error::CliError;
use crate::output::{get_formatter, OutputFormatter};

/// Run the discover command
pub async fn run_discover(args: DiscoverArgs, ctx: Context) -> Result<(), CliError> {
    let discovery = discovery_config(&ctx.config.discovery, &args)?;
    let transport = DiscoveryTransport::from_config(&discovery);
    let duration = Duration::from_secs(args.duration.max(1));

    debug!(strategy = ?discovery.strategy, ?duration, "starting discovery");

    if args.watch {
        run_watch_mode(transport, duration, ctx).await
    } else {
        let formatter = get_formatter(ctx.json);
        run_oneshot_mode(transport, duration, ctx.json, formatter.as_ref()).await
    }
}

/// Settings discovery block with `--strategy` / `--address` applied.
fn discovery_config(base: &DiscoveryConfig, args: &DiscoverArgs) -> Result<DiscoveryConfig, CliError> {
    let mut config = base.clone();

    if !args.addresses.is_empty() {
        config.static_addresses = args.addresses.clone();
        config.strategy = DiscoveryStrategy::Static;
    }
    if let Some(strategy) = args.strategy {
        config.strategy = strategy.into();
    }

    if config.strategy == DiscoveryStrategy::Static
        && config.static_addresses.iter().all(|a| a.trim().is_empty())
    {
        return Err(CliError::InvalidArgument(
            "static discovery needs at least one --address".to_string(),
        ));
    }

    Ok(config)
}

async fn run_oneshot_mode(
    transport: DiscoveryTransport,
    duration: Duration,
    json: bool,
    formatter: &dyn OutputFormatter,
) -> Result<(), CliError> {
    let pb = spinner(
        format!(
            "Discovering receivers via {} for {} seconds...",
            transport.source().display_name(),
            duration.as_secs()
        ),
        json,
    );

    let result = DiscoveryService::discover_once(&transport, duration).await;
    pb.finish_and_clear();
    let devices = result?;

    println!("{}", formatter.format_devices(&devices));

    if devices.is_empty() {
        return Err(CliError::NoDevicesFound);
    }

    Ok(())
}

async fn run_watch_mode(
    transport: DiscoveryTransport,
    duration: Duration,
    ctx: Context,
) -> Result<(), CliError> {
    println!("Watching for receivers (press Ctrl+C to stop)...\n");

    let registry = Arc::new(DeviceRegistry::new());
    let service = DiscoveryService::new(registry.clone(), &ctx.config.registry);

    let json = ctx.json;
    let mut updates = registry.subscribe();
    let render = tokio::spawn(async move {
        loop {
            let devices = updates.borrow_and_update().clone();
            render_watch(&devices, get_formatter(json).as_ref(), json);
            if updates.changed().await.is_err() {
                break;
            }
        }
    });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    // Each round sends a fresh probe; the registry carries devices across
    // rounds and prunes the ones that stop answering.
    let result = loop {
        let mut session = match transport.scan().await {
            Ok(session) => session,
            Err(e) => break Err(CliError::from(e)),
        };

        let round = tokio::time::timeout(duration, async {
            service.run(&mut session).await;
            // Static scans end immediately; hold the round open.
            tokio::time::sleep(duration).await;
        });

        let interrupted = tokio::select! {
            _ = round => false,
            _ = &mut ctrl_c => true,
        };

        session.close().await;
        if interrupted {
            break Ok(());
        }
        registry.prune(ctx.config.registry.max_age());
    };

    render.abort();
    result
}

fn render_watch(devices: &[Device], formatter: &dyn OutputFormatter, json: bool) {
    if json {
        println!("{}", formatter.format_devices(devices));
    } else {
        // Clear screen and print header
        print!("\x1B[2J\x1B[1;1H");
        println!("{}", "TVLink Receiver Watch".bold());
        println!("{}", "Press Ctrl+C to stop".dimmed());
        println!();
        println!("{}", formatter.format_devices(devices));
    }

    io::stdout().flush().ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::StrategyArg;

    fn args(strategy: Option<StrategyArg>, addresses: &[&str]) -> DiscoverArgs {
        DiscoverArgs {
            watch: false,
            duration: 1,
            strategy,
            addresses: addresses.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[test]
    fn test_addresses_imply_static() {
        let config =
            discovery_config(&DiscoveryConfig::default(), &args(None, &["10.0.0.7"])).unwrap();
        assert_eq!(config.strategy, DiscoveryStrategy::Static);
        assert_eq!(config.static_addresses, vec!["10.0.0.7"]);
    }

    #[test]
    fn test_strategy_flag_overrides_settings() {
        let config =
            discovery_config(&DiscoveryConfig::default(), &args(Some(StrategyArg::Mdns), &[]))
                .unwrap();
        assert_eq!(config.strategy, DiscoveryStrategy::Mdns);
    }

    #[test]
    fn test_static_without_addresses_is_rejected() {
        let mut base = DiscoveryConfig::default();
        base.static_addresses.clear();

        assert!(matches!(
            discovery_config(&base, &args(Some(StrategyArg::Static), &[])),
            Err(CliError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_oneshot_static_lists_devices() {
        let config = discovery_config(
            &DiscoveryConfig::default(),
            &args(None, &["10.0.0.7", "10.0.0.8"]),
        )
        .unwrap();
        let transport = DiscoveryTransport::from_config(&config);
        let formatter = get_formatter(true);

        run_oneshot_mode(transport, Duration::from_millis(200), true, formatter.as_ref())
            .await
            .unwrap();
    }
}

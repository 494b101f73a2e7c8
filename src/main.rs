use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc, time::Duration};
use teloxide::{dptree, prelude::*};
use tg_moderator::{
    config::{load_config, parse_config_arg, validate_config},
    directory::{AdminCache, SeenUsers},
    handlers::{schema, AppState},
    ledger::Ledger,
    moderation::Moderator,
    profanity::ProfanityFilter,
    store::JsonFileStore,
    sweeper::run_sweeper,
    telegram::TelegramGateway,
};
use tokio::sync::broadcast;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path =
        parse_config_arg(std::env::args().skip(1)).unwrap_or_else(|| PathBuf::from("config.yaml"));

    let cfg = load_config(&config_path)?;
    validate_config(&cfg)?;

    let filter = cfg.bot.log_level.clone().unwrap_or_else(|| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (shutdown_tx, _shutdown_rx0) = broadcast::channel::<()>(8);

    let shutdown_ctrl = shutdown_tx.clone();
    let ctrl_handle = tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_ctrl.send(());
    });

    let bot = Bot::new(cfg.bot.token.clone());
    let me = bot.get_me().send().await.context("get_me")?;
    let bot_username = me.user.username.clone().unwrap_or_else(|| "bot".into());

    let data_dir = cfg.runtime.data_dir();
    let store = Arc::new(JsonFileStore::in_dir(&data_dir));
    let ledger = Arc::new(Ledger::open(store.clone()).with_context(|| {
        format!("open punishment ledger: {}", store.path().display())
    })?);
    info!(
        "Loaded {} active punishments from {}",
        ledger.len(),
        store.path().display()
    );

    let gateway = Arc::new(TelegramGateway::new(bot.clone()));
    let users = Arc::new(SeenUsers::new());
    let admins = Arc::new(AdminCache::new(gateway.clone()));

    let swear = cfg.moderation.swear_filter.clone();
    let words = swear.as_ref().map(|sf| sf.words.clone()).unwrap_or_default();
    let profanity = ProfanityFilter::new(&words).context("compile swear filter")?;
    if profanity.is_enabled() {
        info!("Swear filter enabled ({} words)", words.len());
    }

    let moderator = Moderator::new(
        ledger.clone(),
        users.clone(),
        admins.clone(),
        gateway.clone(),
        cfg.moderation.limits(),
    );

    let state = Arc::new(AppState {
        moderator,
        users,
        admins: admins.clone(),
        profanity,
        swear,
        approve_join_requests: cfg.moderation.approve_join_requests(),
    });

    let admins_refresh = admins.clone();
    let refresh_secs = cfg.runtime.admin_refresh_secs();
    let mut shutdown_rx_admin = shutdown_tx.subscribe();
    let h_admin = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(refresh_secs));
        loop {
            tokio::select! {
                _ = shutdown_rx_admin.recv() => { break; }
                _ = ticker.tick() => {
                    admins_refresh.refresh_known().await;
                }
            }
        }
    });

    let h_sweep = tokio::spawn(run_sweeper(
        ledger.clone(),
        gateway.clone(),
        Duration::from_secs(cfg.runtime.sweep_interval_secs()),
        shutdown_tx.subscribe(),
    ));

    info!("Start polling as @{}", bot_username);

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            let _ = upd;
        })
        .error_handler(LoggingErrorHandler::with_custom_text("Dispatcher error"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    let _ = shutdown_tx.send(());
    let _ = ctrl_handle.await;
    let _ = h_admin.await;
    let _ = h_sweep.await;

    if let Err(e) = ledger.flush() {
        warn!("final ledger flush failed: {:?}", e);
    }

    Ok(())
}

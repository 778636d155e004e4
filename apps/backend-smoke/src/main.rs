mod config;
mod logging;

use std::process::ExitCode;

use backend_core::{BackendError, ChatClient, NormalizedMessage};
use backend_mattermost::build_client;
use tracing::{error, info, warn};

use crate::config::SmokeConfig;

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let config = match SmokeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "smoke run failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: SmokeConfig) -> Result<(), BackendError> {
    let client = build_client(config.credentials.clone(), config.client_options())?;

    let outcome = client.login().await?;
    let channels = client.session().channels().await;
    info!(
        user = %outcome.user.username,
        team = %outcome.team.name,
        joined = channels.joined.len(),
        more = channels.more.len(),
        users = client.session().users().await.len(),
        "session ready"
    );

    if let Some(channel) = &config.channel {
        show_channel(&client, channel, config.history_limit).await;
    }

    let mut messages = client.start().await?;
    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    let mut received: u64 = 0;
    loop {
        tokio::select! {
            _ = &mut interrupted => {
                info!("interrupted");
                break;
            }
            message = messages.recv() => {
                let Some(message) = message else {
                    warn!("message stream closed");
                    break;
                };
                log_message(&message);
                received += 1;
                if config.max_messages.is_some_and(|max| received >= max) {
                    break;
                }
            }
        }
    }

    client.shutdown().await;
    info!(received, "smoke run finished");
    Ok(())
}

/// Join `channel`, print its header and recent history, then mark it viewed.
async fn show_channel(client: &ChatClient, channel: &str, history_limit: u32) {
    if let Err(err) = client.join_channel(channel).await {
        warn!(channel, error = %err, "could not join channel");
        return;
    }
    let name = channel.strip_prefix('#').unwrap_or(channel);
    let Some(channel_id) = client.session().channel_id(name).await else {
        warn!(channel = name, "joined channel missing from cache");
        return;
    };

    info!(
        channel = name,
        header = %client.channel_header(&channel_id).await,
        "channel joined"
    );
    match client.get_posts(&channel_id, 0, history_limit).await {
        Some(history) => {
            let posts: Vec<_> = history.ordered().collect();
            for post in posts.into_iter().rev() {
                let author = client
                    .session()
                    .username(&post.user_id)
                    .await
                    .unwrap_or_else(|| post.user_id.clone());
                info!(channel = name, user = %author, text = %post.message, "history");
            }
        }
        None => warn!(channel = name, "history unavailable"),
    }
    client.update_last_viewed(&channel_id).await;
}

fn log_message(message: &NormalizedMessage) {
    match &message.post {
        Some(_) => info!(
            team = %message.team,
            channel = %message.channel,
            user = %message.username,
            text = %message.text,
            "message"
        ),
        None => info!(action = %message.raw.action, channel_id = %message.raw.channel_id, "event"),
    }
}

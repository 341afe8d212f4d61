// voicelink — watch↔phone relay harness
//
// Drives two in-process relay endpoints over the loopback transport so the
// protocol (queueing, retry, health checks, credits/language sync) can be
// exercised from a desktop shell.

use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use colored::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use voicelink_core::transport::LoopbackLink;
use voicelink_core::{
    AudioPayload, ConnectionQuality, RelayConfig, SessionManager, TranslationHandler,
    TranslationRequest, TranslationResponse,
};

#[derive(Parser)]
#[command(name = "voicelink")]
#[command(about = "VoiceLink — watch-to-phone relay harness", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted translation session between two loopback endpoints
    Demo {
        /// Target language code (es, fr)
        #[arg(short, long, default_value = "es")]
        target: String,
        /// Starting credits on the phone side
        #[arg(short, long, default_value = "20")]
        credits: u32,
        /// Drop the link mid-run to show queueing and recovery
        #[arg(long)]
        outage: bool,
        /// Print the final link status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Watch health probes classify link quality over time
    Probe {
        /// Number of probe intervals to observe
        #[arg(short, long, default_value = "10")]
        count: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Demo {
            target,
            credits,
            outage,
            json,
        } => cmd_demo(target, credits, outage, json).await,
        Commands::Probe { count } => cmd_probe(count).await,
    }
}

// ============================================================================
// PHONE-SIDE PHRASEBOOK BACKEND
// ============================================================================

/// Offline stand-in for the remote translation backend
struct Phrasebook {
    credits: AtomicU32,
}

fn translate_phrase(heard: &str, target: &str) -> Option<&'static str> {
    match (heard, target) {
        ("hello", "es") => Some("hola"),
        ("good morning", "es") => Some("buenos días"),
        ("where is the station", "es") => Some("dónde está la estación"),
        ("thank you", "es") => Some("gracias"),
        ("hello", "fr") => Some("bonjour"),
        ("good morning", "fr") => Some("bonjour"),
        ("where is the station", "fr") => Some("où est la gare"),
        ("thank you", "fr") => Some("merci"),
        _ => None,
    }
}

#[async_trait]
impl TranslationHandler for Phrasebook {
    async fn translate(&self, request: TranslationRequest) -> TranslationResponse {
        let id = request.id.clone();
        let heard = match &request.audio {
            AudioPayload::Inline(bytes) => String::from_utf8_lossy(bytes).to_string(),
            AudioPayload::FileRef { name, .. } => name.trim_end_matches(".pcm").to_string(),
        };

        let remaining = self.credits.load(Ordering::SeqCst);
        if remaining == 0 {
            return TranslationResponse::failure(id, "out of credits", 0);
        }

        match translate_phrase(&heard, &request.target_language) {
            Some(text) => {
                let credits = self.credits.fetch_sub(1, Ordering::SeqCst) - 1;
                TranslationResponse::success(id, heard, text, None, credits)
            }
            None => TranslationResponse::failure(
                id,
                format!("no translation for '{}'", heard),
                remaining,
            ),
        }
    }

    async fn credits_remaining(&self) -> u32 {
        self.credits.load(Ordering::SeqCst)
    }
}

// ============================================================================
// COMMANDS
// ============================================================================

async fn cmd_demo(target: String, credits: u32, outage: bool, json: bool) -> Result<()> {
    let (link, watch_peer, phone_peer) = LoopbackLink::pair();
    let config = RelayConfig::fast();

    let phone = SessionManager::spawn(
        phone_peer.transport,
        phone_peer.events,
        config.clone(),
        Some(Arc::new(Phrasebook {
            credits: AtomicU32::new(credits),
        })),
    );
    let watch = SessionManager::spawn(watch_peer.transport, watch_peer.events, config, None);

    link.set_reachable(true);
    watch.activate().await?;

    let mut status = watch.status();
    status.wait_for(|s| s.state.is_connected()).await?;
    println!("{} session connected", "✓".green());

    let phrases = ["hello", "good morning", "where is the station", "thank you"];
    for (i, phrase) in phrases.iter().enumerate() {
        if outage && i == 2 {
            println!("{} dropping the link; requests will queue", "!".yellow());
            link.set_reachable(false);
            let restore = link.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(400)).await;
                restore.set_reachable(true);
            });
        }

        let request = TranslationRequest::new(
            "en",
            target.as_str(),
            AudioPayload::Inline(phrase.as_bytes().to_vec()),
        );
        match watch.send_translation_request(request).await {
            Ok(resp) => println!(
                "  {} {} → {}  ({} credits left)",
                "✓".green(),
                phrase,
                resp.translated_text.bold(),
                resp.credits_remaining
            ),
            Err(e) => println!("  {} {} failed: {}", "✗".red(), phrase, e),
        }
    }

    let snapshot = watch.status().borrow().clone();
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!(
            "state {} | quality {} | credits {} | queued {}",
            snapshot.state,
            paint_quality(snapshot.quality),
            snapshot
                .credits
                .map(|c| c.to_string())
                .unwrap_or_else(|| "?".to_string()),
            snapshot.queued_messages
        );
    }

    watch.shutdown().await;
    phone.shutdown().await;
    Ok(())
}

async fn cmd_probe(count: u32) -> Result<()> {
    let (link, watch_peer, phone_peer) = LoopbackLink::pair();
    let config = RelayConfig::fast();
    let interval = config.health_interval;

    let phone = SessionManager::spawn(phone_peer.transport, phone_peer.events, config.clone(), None);
    let watch = SessionManager::spawn(watch_peer.transport, watch_peer.events, config, None);

    link.set_reachable(true);
    watch.activate().await?;

    let mut status = watch.status();
    status.wait_for(|s| s.state.is_connected()).await?;
    println!("{} session connected, probing…", "✓".green());

    for i in 1..=count {
        tokio::time::sleep(interval).await;
        let snapshot = status.borrow().clone();
        println!("  probe {:>2}: quality {}", i, paint_quality(snapshot.quality));
    }

    watch.shutdown().await;
    phone.shutdown().await;
    Ok(())
}

fn paint_quality(quality: ConnectionQuality) -> ColoredString {
    match quality {
        ConnectionQuality::Excellent => "excellent".green(),
        ConnectionQuality::Good => "good".cyan(),
        ConnectionQuality::Fair => "fair".yellow(),
        ConnectionQuality::Poor => "poor".red(),
        ConnectionQuality::Unknown => "unknown".normal(),
    }
}

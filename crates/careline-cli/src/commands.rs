//! Command handlers.
//!
//! Each handler drives one core operation and prints the result. Progress
//! and prompts go to stdout; errors are reported by `main`.

use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Local, Utc};
use tracing::warn;

use careline_core::api::mock::{DEMO_EMAIL, DEMO_PASSWORD};
use careline_core::auth::{MockBiometrics, MAX_PIN_ATTEMPTS};
use careline_core::clock::ManualClock;
use careline_core::error::minutes_rounded_up;
use careline_core::models::{
    sort_chronologically, Activity, ActivityStatus, CareRequest, CareRequestType, Message,
    NewMessage,
};
use careline_core::{CareBackend, CareContext, CareError, Config};

use crate::prompt;

/// Dispatch a command against a live context.
pub async fn run<B>(ctx: &CareContext<B>, config: &mut Config, command: &str, args: &[String]) -> Result<()>
where
    B: CareBackend,
{
    match command {
        "login" => login(ctx, config).await,
        "signup" => signup(ctx, config).await,
        "logout" => {
            ctx.logout()?;
            println!("Logged out.");
            Ok(())
        }
        "status" => status(ctx),
        "requests" => list_requests(ctx).await,
        "new-request" => {
            let request_type: CareRequestType = arg(args, 0, "care request type")?
                .parse()
                .map_err(|e: String| anyhow!(e))?;
            let created = ctx.client().create_care_request(request_type).await?;
            println!("Opened care request {} ({})", created.id, created.request_type.label());
            Ok(())
        }
        "messages" => {
            let id = arg(args, 0, "care request id")?;
            let messages = ctx.client().list_messages(id).await?;
            print_messages(messages);
            Ok(())
        }
        "send" => {
            let id = arg(args, 0, "care request id")?;
            let text = args.get(1..).map(|rest| rest.join(" ")).unwrap_or_default();
            if text.trim().is_empty() {
                bail!("Message text is required");
            }
            let sent = ctx.client().send_message(id, NewMessage::text(text)).await?;
            println!("Sent {} at {}", sent.id, local_time(sent.timestamp));
            Ok(())
        }
        "activities" => list_activities(ctx).await,
        "complete" => {
            let id = arg(args, 0, "question set id")?;
            ctx.client()
                .update_question_set_status(id, ActivityStatus::Completed)
                .await?;
            println!("Question set {} marked completed.", id);
            Ok(())
        }
        "read-referral" => {
            let id = arg(args, 0, "referral message id")?;
            ctx.client().mark_referral_message_read(id).await?;
            println!("Referral message {} marked read.", id);
            Ok(())
        }
        "biometric-enable" => enable_biometric(ctx, config).await,
        "biometric-disable" => {
            ctx.session().disable_biometric()?;
            println!("Biometric login disabled.");
            Ok(())
        }
        "pin-login" => {
            let pin = prompt::secret("PIN: ")?;
            pin_login(ctx, &pin).await
        }
        other => bail!("Unknown command '{}'. Run `careline help` for usage.", other),
    }
}

fn arg<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing {}", what))
}

// ===== Session =====

async fn login<B>(ctx: &CareContext<B>, config: &mut Config) -> Result<()>
where
    B: CareBackend,
{
    println!("\n=== Careline Login ===\n");
    let email = prompt::line("Email", config.last_email.as_deref())?;
    let password = prompt::secret("Password: ")?;

    println!("\nAuthenticating...");
    match ctx.session().login(&email, &password).await {
        Ok(()) => {}
        Err(CareError::Authentication(_)) => bail!("Incorrect email or password"),
        Err(e) => return Err(e.into()),
    }

    remember_email(config, email);
    println!("Login successful!\n");
    Ok(())
}

async fn signup<B>(ctx: &CareContext<B>, config: &mut Config) -> Result<()>
where
    B: CareBackend,
{
    println!("\n=== Create a Careline account ===\n");
    let name = prompt::line("Name", None)?;
    let email = prompt::line("Email", None)?;
    let password = prompt::secret("Password: ")?;
    let confirm = prompt::secret("Confirm password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }

    ctx.session().signup(&name, &email, &password).await?;
    remember_email(config, email);
    println!("Account created and signed in.\n");
    Ok(())
}

fn remember_email(config: &mut Config, email: String) {
    config.last_email = Some(email);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
}

fn status<B>(ctx: &CareContext<B>) -> Result<()>
where
    B: CareBackend,
{
    let now = ctx.clock().now();
    println!(
        "Session:         {}",
        if ctx.session().is_authenticated() { "signed in" } else { "signed out" }
    );

    match ctx.broker().cached()? {
        Some(token) if token.is_fresh(now) => println!(
            "Platform token:  valid for {} more minutes",
            token.minutes_until_expiry(now)
        ),
        Some(_) => println!("Platform token:  expired"),
        None => println!("Platform token:  none"),
    }

    if ctx.session().is_biometric_enabled() {
        let pin = ctx.session().pin_status()?;
        match pin.locked_for(now) {
            Some(wait) => println!(
                "Biometric login: enabled, PIN locked for {} more minutes",
                minutes_rounded_up(&wait)
            ),
            None => println!(
                "Biometric login: enabled, {} PIN attempts remaining",
                pin.remaining_attempts()
            ),
        }
    } else {
        println!("Biometric login: not enabled");
    }
    Ok(())
}

async fn enable_biometric<B>(ctx: &CareContext<B>, config: &Config) -> Result<()>
where
    B: CareBackend,
{
    let email = prompt::line("Email", config.last_email.as_deref())?;
    let password = prompt::secret("Password: ")?;
    let pin = prompt::secret("Choose a 4-6 digit PIN: ")?;

    if ctx.session().enable_biometric(&email, &password, &pin).await? {
        println!("Biometric login enabled.");
    } else {
        println!("Biometric login is not available on this device.");
    }
    Ok(())
}

async fn pin_login<B>(ctx: &CareContext<B>, pin: &str) -> Result<()>
where
    B: CareBackend,
{
    match ctx.session().authenticate_with_pin(pin).await {
        Ok(()) => {
            println!("Signed in with PIN.");
            Ok(())
        }
        Err(CareError::PinRejected { remaining_attempts }) => {
            bail!("Incorrect PIN - {} of {} attempts remaining", remaining_attempts, MAX_PIN_ATTEMPTS)
        }
        Err(e) => Err(e.into()),
    }
}

// ===== Care requests and messages =====

async fn list_requests<B>(ctx: &CareContext<B>) -> Result<()>
where
    B: CareBackend,
{
    let requests = ctx.client().list_care_requests().await?;
    print_requests(&requests);
    Ok(())
}

fn print_requests(requests: &[CareRequest]) {
    if requests.is_empty() {
        println!("No care requests yet. Open one with `careline new-request <type>`.");
        return;
    }
    for request in requests {
        let marker = if request.has_unread() { "*" } else { " " };
        let locked = if request.is_locked { " (closed)" } else { "" };
        println!(
            "{} {:<12} {:<10} {}{}",
            marker,
            request.id,
            request.request_type.as_str(),
            request.display_title(),
            locked
        );
    }
}

fn print_messages(mut messages: Vec<Message>) {
    sort_chronologically(&mut messages);
    if messages.is_empty() {
        println!("No messages.");
        return;
    }
    for message in &messages {
        println!(
            "[{}] {}: {}",
            local_time(message.timestamp),
            message.author.name,
            message.text
        );
        if !message.attachments.is_empty() {
            println!("    ({} attachment(s))", message.attachments.len());
        }
    }
}

async fn list_activities<B>(ctx: &CareContext<B>) -> Result<()>
where
    B: CareBackend,
{
    let activities = ctx.client().list_activities().await?;
    print_activities(&activities);
    Ok(())
}

fn print_activities(activities: &[Activity]) {
    if activities.is_empty() {
        println!("No activities.");
        return;
    }
    for activity in activities {
        let target = activity
            .question_set_id
            .as_deref()
            .or(activity.referral_id.as_deref())
            .unwrap_or("-");
        println!(
            "{}  {:<22} {:<12} {} (request {})",
            local_time(activity.created_at),
            activity.title,
            activity.status.to_string(),
            target,
            activity.care_request_id
        );
    }
}

fn local_time(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

// ===== Demo =====

/// Walk through every flow against the seeded mock backend.
pub async fn demo() -> Result<()> {
    let clock = Arc::new(ManualClock::default());
    let biometrics = Arc::new(MockBiometrics::default());
    let ctx = CareContext::mock_with(clock.clone(), biometrics.clone());

    println!("== Sign in as {} ==", DEMO_EMAIL);
    ctx.session().login(DEMO_EMAIL, DEMO_PASSWORD).await?;
    list_requests(&ctx).await?;

    println!("\n== Open a care request ==");
    let created = ctx.client().create_care_request(CareRequestType::Sick).await?;
    println!("Opened {} ({})", created.id, created.request_type.label());

    clock.advance(chrono::Duration::minutes(1));
    ctx.client()
        .send_message(&created.id, NewMessage::text("I've had a fever since yesterday."))
        .await?;
    print_messages(ctx.client().list_messages(&created.id).await?);

    println!("\n== Activities ==");
    list_activities(&ctx).await?;

    println!("\n== Platform token expiry ==");
    clock.advance(chrono::Duration::minutes(20));
    list_requests(&ctx).await?;
    println!("Platform token exchanges so far: {}", ctx.backend().exchange_calls());

    println!("\n== Biometric enrollment ==");
    ctx.session()
        .enable_biometric(DEMO_EMAIL, DEMO_PASSWORD, "2468")
        .await?;
    ctx.logout()?;
    println!("Logged out; biometric login succeeds: {}", ctx.session().authenticate_with_biometric().await?);

    println!("\n== PIN fallback ==");
    ctx.logout()?;
    biometrics.set_approve(false);
    println!("Biometric prompt declined: {}", !ctx.session().authenticate_with_biometric().await?);
    for _ in 0..MAX_PIN_ATTEMPTS {
        match ctx.session().authenticate_with_pin("0000").await {
            Err(CareError::PinRejected { remaining_attempts }) => {
                println!("Wrong PIN, {} attempts remaining", remaining_attempts)
            }
            Err(e @ CareError::Lockout { .. }) => println!("{}", e.user_message()),
            other => bail!("Unexpected PIN result: {:?}", other),
        }
    }
    clock.advance(chrono::Duration::minutes(61));
    pin_login(&ctx, "2468").await?;
    status(&ctx)?;

    ctx.session().disable_biometric()?;
    ctx.logout()?;
    println!("\nDemo complete.");
    Ok(())
}

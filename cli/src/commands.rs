//! Subcommand runners.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Local};
use serde_json::Value;
use tokio::sync::mpsc;

use wicket_client::ApiRequest;
use wicket_core::{AccessStateMachine, Attempt, RouteGuard, Signal};
use wicket_types::{
    AccessState, Credential, NonEmptyString, RegistrationProfile, Role, StorageTier,
    classify_session,
};
use wicket_utils::redact_token;

use crate::App;

/// Sign-up fields as given on the command line.
pub(crate) struct RegisterForm {
    pub identifier: String,
    pub name: String,
    pub role: String,
    pub password: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub grade_level: Option<u32>,
    pub class_name: Option<String>,
    pub subject: Option<String>,
    pub child_name: Option<String>,
    pub invite_code: Option<String>,
}

pub(crate) async fn login(
    app: &App,
    identifier: String,
    password: Option<String>,
    remember: bool,
) -> Result<()> {
    let credential = credential(identifier, password)?;
    run_access_flow(app, Attempt::Login { credential, remember }).await
}

pub(crate) async fn register(app: &App, form: RegisterForm, remember: bool) -> Result<()> {
    let credential = credential(form.identifier, form.password)?;
    let mut profile = RegistrationProfile::new(credential, form.name, Role::new(&form.role));
    profile.email = form.email;
    profile.phone = form.phone;
    profile.grade_level = form.grade_level;
    profile.class_name = form.class_name;
    profile.subject = form.subject;
    profile.child_name = form.child_name;
    profile.invite_code = form.invite_code;

    run_access_flow(
        app,
        Attempt::Register {
            profile: Box::new(profile),
            remember,
        },
    )
    .await
}

pub(crate) async fn demo(app: &App, role: &str) -> Result<()> {
    run_access_flow(
        app,
        Attempt::Demo {
            role: Role::new(role),
        },
    )
    .await?;
    println!("Demo sessions are kept in memory and end with this command.");
    Ok(())
}

pub(crate) async fn unlock(app: &App, identifier: String, secret: Option<String>) -> Result<()> {
    let Some(secret) = secret.or_else(|| app.config.developer_secret()) else {
        bail!("no developer secret: pass --secret or set WICKET_DEV_SECRET");
    };
    run_access_flow(app, Attempt::DeveloperUnlock { identifier, secret }).await
}

pub(crate) fn status(app: &App) -> Result<()> {
    let demo_token = app.config.demo_token();
    match app.store.read()? {
        None => println!("No active session."),
        Some(active) => {
            let session = &active.session;
            println!("User:         {}", session.display_name);
            println!("Role:         {}", session.role);
            println!("Subscription: {}", session.subscription);
            println!("Token:        {}", redact_token(session.token.expose_secret()));
            println!("Storage:      {}", active.tier);
            println!(
                "Entitlement:  {}",
                classify_session(session, &demo_token)
            );
            if active.tier == StorageTier::Persistent
                && let Some(saved) = persisted_at(app)
            {
                println!("Saved:        {}", saved.format("%Y-%m-%d %H:%M:%S"));
            }
        }
    }

    let guard = RouteGuard::new(app.store.clone());
    let decision = if guard.is_admitted() {
        "admitted"
    } else {
        "refused"
    };
    println!("Route guard:  {decision}");
    Ok(())
}

pub(crate) async fn logout(app: &App) -> Result<()> {
    app.api.logout().await?;
    println!("Logged out.");
    Ok(())
}

pub(crate) async fn call(
    app: &App,
    method: &str,
    path: String,
    body: Option<&str>,
    ai: Option<String>,
) -> Result<()> {
    let request = build_request(method, path, body, ai)?;

    let mut events = app.api.events().subscribe();
    let result = app.api.send(request).await;
    while let Ok(event) = events.try_recv() {
        println!("event: {}", serde_json::to_string(&event)?);
    }

    let value = result?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// AI calls are POST-only; any other method with `--ai` is refused.
fn build_request(
    method: &str,
    path: String,
    body: Option<&str>,
    ai: Option<String>,
) -> Result<ApiRequest> {
    let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid HTTP method {method:?}"))?;
    let body = body
        .map(serde_json::from_str::<Value>)
        .transpose()
        .context("--body is not valid JSON")?;

    if let Some(feature) = ai {
        if method != reqwest::Method::POST {
            bail!("--ai requests are sent as POST, not {method}");
        }
        return Ok(ApiRequest::ai(feature, path, body.unwrap_or(Value::Null)));
    }

    let request = ApiRequest::new(method, path);
    Ok(match body {
        Some(body) => request.with_body(body),
        None => request,
    })
}

fn credential(identifier: String, password: Option<String>) -> Result<Credential> {
    let identifier =
        NonEmptyString::new(identifier).map_err(|_| anyhow!("identifier must not be empty"))?;
    let password = match password {
        Some(password) => password,
        None => read_password()?,
    };
    Ok(Credential::new(identifier, password))
}

fn read_password() -> Result<String> {
    eprint!("Password: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn persisted_at(app: &App) -> Option<DateTime<Local>> {
    let path = app.config.persistent_path()?;
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(DateTime::<Local>::from(modified))
}

async fn run_access_flow(app: &App, attempt: Attempt) -> Result<()> {
    let (machine, mut signals) = AccessStateMachine::new(
        app.authenticator.clone(),
        app.store.clone(),
        app.timings,
    );
    let machine = machine.with_demo_token(app.config.demo_token());

    let submitted = tokio::select! {
        result = machine.submit(attempt) => result,
        _ = tokio::signal::ctrl_c() => {
            machine.dispose();
            println!("Cancelled.");
            return Ok(());
        }
    };
    if let Err(err) = submitted {
        drain(&mut signals);
        return Err(err.into());
    }

    loop {
        tokio::select! {
            signal = signals.recv() => {
                let Some(signal) = signal else { break };
                let terminal = matches!(signal, Signal::Completed | Signal::RedirectToUpgrade);
                print_signal(app, &signal);
                if terminal {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                machine.dispose();
                println!("Cancelled.");
                break;
            }
        }
    }
    Ok(())
}

fn drain(signals: &mut mpsc::UnboundedReceiver<Signal>) {
    while let Ok(signal) = signals.try_recv() {
        if let Signal::State(state) = signal {
            println!("-> {state}");
        }
    }
}

fn print_signal(app: &App, signal: &Signal) {
    match signal {
        Signal::State(AccessState::Granted) => println!("-> granted: access confirmed"),
        Signal::State(AccessState::Denied) => {
            println!("-> denied: this account needs an active subscription");
        }
        Signal::State(AccessState::Welcome) => {
            let name = app
                .store
                .read()
                .ok()
                .flatten()
                .map(|active| active.session.display_name)
                .unwrap_or_default();
            println!("-> welcome {name}");
        }
        Signal::State(state) => println!("-> {state}"),
        Signal::Error(message) => eprintln!("error: {message}"),
        Signal::RedirectToUpgrade => println!("Continue at the upgrade page to subscribe."),
        Signal::Completed => println!("Access complete."),
    }
}

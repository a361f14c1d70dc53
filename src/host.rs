//! Terminal host for the live controller.
//!
//! Every plain stdin line replaces the prompt draft, the way each keystroke
//! replaces the text field contents in a browser. Lines starting with `:` are
//! commands.

use crate::commands;
use crate::controller::{ControllerPhase, ControllerSnapshot};
use crate::state::AppState;
use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

const HELP: &str = "\
Type a prompt to generate live. Commands:
  :go                          generate the current prompt now
  :retry                       re-issue the current prompt even if unchanged
  :auto on|off                 toggle live generation
  :rm <image-id>               remove an image from the gallery
  :clear                       start a fresh gallery
  :save <title>                save the gallery as a story
  :stories                     list saved stories
  :dashboard                   story totals and recent stories
  :signup <email> <pw> <name>  create an account
  :login <email> <pw>          sign in
  :logout                      sign out
  :status                      show controller state
  :quit                        exit";

#[derive(Debug, PartialEq, Eq)]
pub enum HostCommand {
    Draft(String),
    Go,
    Retry,
    Auto(bool),
    Remove(String),
    Clear,
    Save(String),
    Stories,
    Dashboard,
    SignUp { email: String, password: String, name: String },
    Login { email: String, password: String },
    Logout,
    Status,
    Help,
    Quit,
    Unknown(String),
}

pub fn parse_line(line: &str) -> HostCommand {
    let Some(rest) = line.strip_prefix(':') else {
        return HostCommand::Draft(line.to_string());
    };
    let mut parts = rest.split_whitespace();
    let Some(name) = parts.next() else {
        return HostCommand::Unknown(line.to_string());
    };
    let args: Vec<&str> = parts.collect();

    match (name, args.as_slice()) {
        ("go", []) => HostCommand::Go,
        ("retry", []) => HostCommand::Retry,
        ("auto", ["on"]) => HostCommand::Auto(true),
        ("auto", ["off"]) => HostCommand::Auto(false),
        ("rm", [id]) => HostCommand::Remove(id.to_string()),
        ("clear", []) => HostCommand::Clear,
        ("save", title) if !title.is_empty() => HostCommand::Save(title.join(" ")),
        ("stories", []) => HostCommand::Stories,
        ("dashboard", []) => HostCommand::Dashboard,
        ("signup", [email, password, name @ ..]) if !name.is_empty() => HostCommand::SignUp {
            email: email.to_string(),
            password: password.to_string(),
            name: name.join(" "),
        },
        ("login", [email, password]) => HostCommand::Login {
            email: email.to_string(),
            password: password.to_string(),
        },
        ("logout", []) => HostCommand::Logout,
        ("status", []) => HostCommand::Status,
        ("help", []) => HostCommand::Help,
        ("quit", []) | ("q", []) => HostCommand::Quit,
        _ => HostCommand::Unknown(line.to_string()),
    }
}

fn describe(snapshot: &ControllerSnapshot) -> String {
    let phase = match snapshot.phase {
        ControllerPhase::Uninitialized => "starting",
        ControllerPhase::Unauthenticated => "signed out",
        ControllerPhase::Ready => "ready",
        ControllerPhase::ReadyAwaitingResult => "generating",
    };
    let mut out = format!(
        "[{}] live={} images={} draft={:?}",
        phase,
        if snapshot.auto_generate { "on" } else { "off" },
        snapshot.images.len(),
        snapshot.draft
    );
    if let Some(e) = &snapshot.last_error {
        out.push_str(&format!(" error={}", e));
    }
    out
}

async fn print_updates(mut snapshots: watch::Receiver<ControllerSnapshot>) {
    let mut previous = snapshots.borrow_and_update().clone();
    while snapshots.changed().await.is_ok() {
        let current = snapshots.borrow_and_update().clone();
        if current.busy && !previous.busy {
            println!(
                "… generating \"{}\"",
                current.last_issued_prompt.as_deref().unwrap_or_default()
            );
        }
        if current.images.len() > previous.images.len() {
            if let Some(image) = current.images.first() {
                let src = image.image_data.to_src();
                let preview: String = src.chars().take(60).collect();
                println!("+ {} \"{}\" {}", image.id, image.prompt, preview);
            }
        }
        if current.last_error != previous.last_error {
            if let Some(e) = &current.last_error {
                println!("! {}", e);
            }
        }
        previous = current;
    }
}

fn report(result: Result<(), String>) {
    if let Err(e) = result {
        println!("! {}", e);
    }
}

pub async fn run_terminal(state: AppState) -> Result<()> {
    let phase = state.controller.start().await?;
    if phase == ControllerPhase::Unauthenticated {
        println!("Not signed in. Use :login or :signup first.");
    }
    println!("{}", HELP);

    let printer = tokio::spawn(print_updates(state.controller.subscribe()));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        match parse_line(&line) {
            HostCommand::Draft(text) => state.controller.on_input_change(text),
            HostCommand::Go => match state.controller.force_generate_now().await {
                Ok(true) => {}
                Ok(false) => println!("Nothing new to generate (or a request is running)."),
                Err(e) => println!("! {}", e),
            },
            HostCommand::Retry => {
                let draft = state.controller.snapshot().draft;
                let controller = state.controller.clone();
                // The printer reports the outcome through the snapshot
                tokio::spawn(async move {
                    if let Err(e) = controller.issue(draft).await {
                        log::debug!("Retry did not produce an image: {}", e);
                    }
                });
            }
            HostCommand::Auto(enabled) => state.controller.set_auto_generate(enabled),
            HostCommand::Remove(id) => match commands::remove_image(&state, id).await {
                Ok(true) => println!("Removed."),
                Ok(false) => println!("No such image."),
                Err(e) => println!("! {}", e),
            },
            HostCommand::Clear => state.controller.clear_gallery(),
            HostCommand::Save(title) => {
                match commands::save_gallery_as_story(&state, title, String::new()).await {
                    Ok(story) => println!("Saved story {} ({} images).", story.id, story.images.len()),
                    Err(e) => println!("! {}", e),
                }
            }
            HostCommand::Stories => match commands::list_stories(&state).await {
                Ok(stories) if stories.is_empty() => println!("No stories yet."),
                Ok(stories) => {
                    for story in stories {
                        println!(
                            "{}  {}  ({} images, updated {})",
                            story.id,
                            story.title,
                            story.images.len(),
                            story.updated_at.format("%Y-%m-%d %H:%M")
                        );
                    }
                }
                Err(e) => println!("! {}", e),
            },
            HostCommand::Dashboard => match commands::dashboard_stats(&state).await {
                Ok(stats) => {
                    println!(
                        "{} stories, {} images, {} updated in the last 24h",
                        stats.total_stories, stats.total_images, stats.recent_activity
                    );
                    for story in stats.recent {
                        println!("  {}  {}  ({} images)", story.id, story.title, story.images.len());
                    }
                }
                Err(e) => println!("! {}", e),
            },
            HostCommand::SignUp { email, password, name } => report(
                commands::sign_up(&state, email, password, name)
                    .await
                    .map(|user| println!("Welcome, {}.", user.name)),
            ),
            HostCommand::Login { email, password } => report(
                commands::login(&state, email, password)
                    .await
                    .map(|user| println!("Signed in as {}.", user.email)),
            ),
            HostCommand::Logout => report(commands::logout(&state).await),
            HostCommand::Status => {
                if let Err(e) = state.controller.flush().await {
                    println!("! {}", e);
                }
                println!("{}", describe(&state.controller.snapshot()));
            }
            HostCommand::Help => println!("{}", HELP),
            HostCommand::Quit => break,
            HostCommand::Unknown(line) => println!("Unknown command: {} (try :help)", line),
        }
    }

    state.controller.shutdown();
    printer.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_drafts() {
        assert_eq!(parse_line("a cat sitting"), HostCommand::Draft("a cat sitting".to_string()));
        assert_eq!(parse_line(""), HostCommand::Draft(String::new()));
    }

    #[test]
    fn parses_commands() {
        assert_eq!(parse_line(":go"), HostCommand::Go);
        assert_eq!(parse_line(":auto off"), HostCommand::Auto(false));
        assert_eq!(parse_line(":save My trip to the sea"), HostCommand::Save("My trip to the sea".to_string()));
        assert_eq!(
            parse_line(":signup ada@example.com lovelace Ada King"),
            HostCommand::SignUp {
                email: "ada@example.com".to_string(),
                password: "lovelace".to_string(),
                name: "Ada King".to_string(),
            }
        );
        assert_eq!(parse_line(":dashboard"), HostCommand::Dashboard);
        assert_eq!(parse_line(":q"), HostCommand::Quit);
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!(matches!(parse_line(":save"), HostCommand::Unknown(_)));
        assert!(matches!(parse_line(":login ada@example.com"), HostCommand::Unknown(_)));
        assert!(matches!(parse_line(":auto maybe"), HostCommand::Unknown(_)));
        assert!(matches!(parse_line(":"), HostCommand::Unknown(_)));
    }
}

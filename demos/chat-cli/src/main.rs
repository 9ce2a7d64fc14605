//! Line-oriented chat front end over the session controller.
//!
//! Run with: cargo run -p chat-cli-demo
//!
//! Uses the scripted transport (echo) and directory storage under
//! `$AI_LAWYER_HOME` or the platform data dir.

use std::{
    io::Write as _,
    path::{Path, PathBuf},
    sync::Arc,
};

use ai_lawyer_core::{ChatConfig, Role, SessionEvent, SessionStore};
use ai_lawyer_session::{
    GroundingUrls, SessionController, TurnRequest, storage::DirStorage,
};
use ai_lawyer_transport::{Attachment, ScriptedTransport};
use anyhow::Context as _;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

type Controller = SessionController<ScriptedTransport, DirStorage, DirStorage>;

const HELP: &str = "\
Commands:
  /attach <path>   attach an image to the next message
  /url add <url>   use a web page as a source
  /url rm <url>    stop using a source
  /new             start a new chat
  /save            export the chat to a file
  /load <path>     load a chat from a file
  /history         print the conversation
  /quit            exit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let home = storage_home().context("no storage directory available")?;
    tracing::info!(path = %home.display(), "Using storage directory");
    let storage = DirStorage::new(home);

    let controller: Arc<Controller> = Arc::new(SessionController::new(
        ChatConfig::default(),
        ScriptedTransport::new(),
        storage.clone(),
        storage.clone(),
    ));

    let store = controller.store();
    tokio::spawn(render_updates(Arc::clone(&store)));

    if let Err(e) = controller.initialize().await {
        eprintln!("{e}");
    }
    print_history(&store);
    println!("{HELP}");

    run(&controller, &storage).await
}

fn storage_home() -> Option<PathBuf> {
    std::env::var_os("AI_LAWYER_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::data_dir().map(|d| d.join("ai-lawyer")))
}

#[derive(Default)]
struct App {
    attachment: Option<Attachment>,
    urls: GroundingUrls,
}

impl App {
    fn attach(&mut self, path: &Path) {
        let Some(mime_type) = Attachment::mime_type_for(path) else {
            println!("Непідтримуваний тип файлу. Будь ласка, виберіть зображення (JPEG, PNG, WEBP, HEIC, HEIF).");
            return;
        };
        let attachment = Attachment::from_path(path, mime_type);
        println!("Attached {}", attachment.name);
        self.attachment = Some(attachment);
    }

    fn take_request(&mut self, text: &str) -> TurnRequest {
        let mut request = TurnRequest::new(text).with_sources(&self.urls);
        request.attachment = self.attachment.take();
        request
    }
}

async fn run(controller: &Controller, storage: &DirStorage) -> anyhow::Result<()> {
    let mut app = App::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end();
        let (command, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim();

        match command {
            "/quit" => break,
            "/help" => println!("{HELP}"),
            "/attach" => app.attach(Path::new(arg)),
            "/url" => match arg.split_once(' ') {
                Some(("add", url)) => match app.urls.add(url) {
                    Ok(_) => println!("Sources: {}", app.urls.as_slice().join(", ")),
                    Err(e) => println!("{e}"),
                },
                Some(("rm", url)) => {
                    app.urls.remove(url.trim());
                    println!("Sources: {}", app.urls.as_slice().join(", "));
                }
                _ => println!("{HELP}"),
            },
            "/new" => {
                if let Err(e) = controller.new_chat().await {
                    println!("{e}");
                }
                print_history(&controller.store());
            }
            "/save" => match controller.export().await {
                Ok(name) => println!("Saved to {}", storage.export_dir().join(name).display()),
                Err(e) => println!("{e}"),
            },
            "/load" => {
                storage.stage_import(arg)?;
                match controller.import().await {
                    Ok(_) => print_history(&controller.store()),
                    Err(e) => println!("{e}"),
                }
            }
            "/history" => print_history(&controller.store()),
            _ => {
                let request = app.take_request(line);
                if let Err(e) = controller.submit(request).await {
                    println!("\n{e}");
                }
                println!();
            }
        }
    }

    Ok(())
}

fn print_history(store: &SessionStore) {
    for msg in store.messages() {
        let who = match msg.role {
            Role::User => "Ви",
            Role::Model => "AI-Юрист",
        };
        println!("[{who}] {}", msg.text);
        if let Some(file) = &msg.attachment {
            println!("    📎 {} ({})", file.name, file.mime_type);
        }
        for source in msg.sources.iter().flatten() {
            println!("    ↳ {} <{}>", source.title, source.uri);
        }
    }
}

/// Print streamed model text as it arrives.
async fn render_updates(store: Arc<SessionStore>) {
    let mut updates = store.updates();
    let mut printed = 0usize;

    while let Some(event) = updates.next().await {
        match event {
            SessionEvent::MessageAppended(msg) if msg.role == Role::Model => {
                print!("[AI-Юрист] {}", msg.text);
                printed = msg.text.len();
            }
            SessionEvent::MessageUpdated(msg) => {
                if let Some(delta) = msg.text.get(printed..) {
                    print!("{delta}");
                }
                printed = msg.text.len();
            }
            _ => continue,
        }
        if let Err(e) = std::io::stdout().flush() {
            tracing::debug!("Failed to flush stdout: {e}");
        }
    }
}

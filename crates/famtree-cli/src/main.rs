use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use famtree_core::Relationship;
use famtree_vision::{encode_data_url, sniff};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use uuid::Uuid;

mod client;

use client::ApiClient;

#[derive(Parser)]
#[command(name = "famtree", about = "Family Tree Album CLI")]
struct Cli {
    /// famtreed base URL
    #[arg(long, env = "FAMTREE_URL", default_value = "http://127.0.0.1:8080", global = true)]
    url: String,

    /// Session token from `signin` or `signup`
    #[arg(long, env = "FAMTREE_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "FAMTREE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign in and print a session token
    Signin {
        #[arg(long)]
        email: String,
        #[arg(long, env = "FAMTREE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Revoke the current session
    Signout,
    /// Count the faces in an image without storing it
    Detect {
        file: PathBuf,
    },
    /// Upload a photo of a single person
    Upload {
        file: PathBuf,
        /// Name of the person in the photo
        #[arg(short, long)]
        name: String,
        /// Relationship to you (e.g. "Parent", "Aunt/Uncle")
        #[arg(short, long)]
        relationship: Relationship,
    },
    /// List your photos, newest first
    List {
        #[arg(short, long)]
        relationship: Option<Relationship>,
    },
    /// Delete a photo
    Remove {
        /// Photo ID to remove
        id: Uuid,
    },
    /// List the relationship labels
    Relationships,
    /// Show service and upload status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = ApiClient::new(&cli.url, cli.token)?;

    match cli.command {
        Commands::Signup {
            name,
            email,
            password,
        } => {
            let body = json!({ "name": name, "email": email, "password": password });
            let session = client.post("/api/auth/signup", Some(body)).await?;
            print_session(&session);
        }
        Commands::Signin { email, password } => {
            let body = json!({ "email": email, "password": password });
            let session = client.post("/api/auth/signin", Some(body)).await?;
            print_session(&session);
        }
        Commands::Signout => {
            require_token(&client)?;
            client.post("/api/auth/signout", None).await?;
            println!("Signed out");
        }
        Commands::Detect { file } => {
            require_token(&client)?;
            let image = read_data_url(&file)?;
            let result = client
                .post("/api/detect-faces", Some(json!({ "image": image })))
                .await?;
            println!("{}", str_field(&result, "message"));
        }
        Commands::Upload {
            file,
            name,
            relationship,
        } => {
            require_token(&client)?;
            upload(&client, &file, &name, relationship).await?;
        }
        Commands::List { relationship } => {
            require_token(&client)?;
            let query: Vec<(&str, &str)> = relationship
                .iter()
                .map(|rel| ("relationship", rel.label()))
                .collect();
            let listing = client.get_query("/api/photos", &query).await?;
            let photos = listing["photos"].as_array().cloned().unwrap_or_default();
            if photos.is_empty() {
                println!("{}", empty_message(&listing));
            }
            for photo in &photos {
                println!("{}", photo_line(photo));
            }
        }
        Commands::Remove { id } => {
            require_token(&client)?;
            client.delete(&format!("/api/photos/{id}")).await?;
            println!("Removed photo {id}");
        }
        Commands::Relationships => {
            let labels = client.get("/api/relationships").await?;
            for label in labels.as_array().into_iter().flatten() {
                println!("{}", label.as_str().unwrap_or_default());
            }
        }
        Commands::Status => {
            match client.health().await {
                Ok(health) => println!("famtreed: {}", health.trim()),
                Err(e) => {
                    println!("famtreed: not reachable ({e:#})");
                    return Ok(());
                }
            }
            if client.has_token() {
                let snapshot = client.get("/api/uploads/current").await?;
                println!("upload: {}", upload_status(&snapshot));
            } else {
                println!("upload: not signed in");
            }
        }
    }

    Ok(())
}

/// Select, fill in details, commit. A rejected or failed upload is cleared
/// so the next attempt starts from idle.
async fn upload(client: &ApiClient, file: &Path, name: &str, relationship: Relationship) -> Result<()> {
    let image = read_data_url(file)?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let snapshot = client
        .post(
            "/api/uploads",
            Some(json!({ "fileName": file_name, "image": image })),
        )
        .await?;
    println!("{}", str_field(&snapshot, "message"));
    if snapshot["phase"] != "accepted" {
        client.delete("/api/uploads/current").await?;
        bail!("upload rejected");
    }

    let details = json!({ "personName": name, "relationship": relationship.label() });
    let committed = match client.patch("/api/uploads/current", details).await {
        Ok(_) => client.post("/api/uploads/current/commit", None).await,
        Err(e) => Err(e),
    };
    match committed {
        Ok(receipt) => {
            println!("Saved {}", photo_line(&receipt["photo"]));
            Ok(())
        }
        Err(e) => {
            if let Err(cancel) = client.delete("/api/uploads/current").await {
                tracing::warn!(error = %cancel, "failed to clear pending upload");
            }
            Err(e)
        }
    }
}

fn require_token(client: &ApiClient) -> Result<()> {
    if !client.has_token() {
        bail!("not signed in; set FAMTREE_TOKEN or pass --token");
    }
    Ok(())
}

fn read_data_url(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(encode_data_url(sniff::mime_type(&bytes), &bytes))
}

fn print_session(session: &Value) {
    println!("Signed in as {}", str_field(&session["user"], "email"));
    println!("export FAMTREE_TOKEN={}", str_field(session, "token"));
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn photo_line(photo: &Value) -> String {
    format!(
        "{}  {:<16} {}  {}",
        str_field(photo, "id"),
        str_field(photo, "relationship"),
        str_field(photo, "personName"),
        str_field(photo, "url"),
    )
}

fn empty_message(listing: &Value) -> &'static str {
    if listing["total"].as_u64().unwrap_or(0) == 0 {
        "No photos yet"
    } else {
        "No photos match this filter"
    }
}

fn upload_status(snapshot: &Value) -> String {
    let phase = str_field(snapshot, "phase");
    match snapshot.get("message").and_then(Value::as_str) {
        Some(message) => format!("{phase} ({message})"),
        None => phase.to_string(),
    }
}

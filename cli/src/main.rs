use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use postboard::config::{DEFAULT_API_BASE_URL, DEFAULT_LANDING_ROUTE, DEFAULT_LOGIN_ROUTE};
use postboard::types::{ImageFile, PostDraft, SignupRequest};
use postboard::{ApiError, ClientConfig, ConfigError, CredentialMode, FileStore, Identity, Session, SessionObserver};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("not logged in; run `postboard-cli login` first")]
    NotLoggedIn,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("client setup failed: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to read {path}: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("invalid JSON output: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "postboard-cli", about = "Postboard community API CLI")]
struct Cli {
    #[arg(long, env = "POSTBOARD_API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    base_url: String,

    #[arg(long, env = "POSTBOARD_CREDENTIAL_MODE", default_value = "bearer")]
    credential_mode: CredentialMode,

    #[arg(long, env = "POSTBOARD_SESSION_FILE", default_value = ".postboard-session.json")]
    session_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "POSTBOARD_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long, env = "POSTBOARD_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        nickname: String,
        #[arg(long)]
        profile_image_url: Option<String>,
    },
    Logout,
    Whoami,
    Post(PostCommand),
    Comment(CommentCommand),
    User(UserCommand),
    Image(ImageCommand),
}

#[derive(Args, Debug)]
struct PostCommand {
    #[command(subcommand)]
    command: PostSubcommand,
}

#[derive(Subcommand, Debug)]
enum PostSubcommand {
    List {
        #[arg(long, default_value_t = 0)]
        page: u32,
        #[arg(long, default_value_t = postboard::services::posts::DEFAULT_PAGE_SIZE)]
        size: u32,
    },
    Read {
        post_id: i64,
    },
    Create(PostDraftArgs),
    Update {
        post_id: i64,
        #[command(flatten)]
        draft: PostDraftArgs,
    },
    Delete {
        post_id: i64,
    },
    Like {
        post_id: i64,
    },
}

#[derive(Args, Debug)]
struct PostDraftArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    body: String,
    #[arg(long = "image-url")]
    image_urls: Vec<String>,
}

impl From<PostDraftArgs> for PostDraft {
    fn from(args: PostDraftArgs) -> Self {
        Self { title: args.title, body: args.body, image_urls: args.image_urls }
    }
}

#[derive(Args, Debug)]
struct CommentCommand {
    #[command(subcommand)]
    command: CommentSubcommand,
}

#[derive(Subcommand, Debug)]
enum CommentSubcommand {
    List {
        post_id: i64,
    },
    Create {
        post_id: i64,
        #[arg(long)]
        body: String,
    },
    Update {
        comment_id: i64,
        #[arg(long)]
        body: String,
    },
    Delete {
        comment_id: i64,
    },
}

#[derive(Args, Debug)]
struct UserCommand {
    #[command(subcommand)]
    command: UserSubcommand,
}

#[derive(Subcommand, Debug)]
enum UserSubcommand {
    Profile,
    Update {
        #[arg(long)]
        nickname: String,
        #[arg(long, help = "Profile image to upload before updating")]
        image: Option<PathBuf>,
    },
    Deactivate,
    Password {
        #[arg(long)]
        new_password: String,
        #[arg(long)]
        confirm_password: String,
    },
}

#[derive(Args, Debug)]
struct ImageCommand {
    #[command(subcommand)]
    command: ImageSubcommand,
}

#[derive(Subcommand, Debug)]
enum ImageSubcommand {
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

/// Logs identity changes; the CLI has no UI to redraw.
struct LogObserver;

impl SessionObserver for LogObserver {
    fn update_ui(&self, identity: Option<&Identity>) {
        match identity {
            Some(identity) => tracing::info!(user_id = identity.id, nickname = %identity.nickname, "signed in"),
            None => tracing::info!("signed out"),
        }
    }
}

fn client_config(cli: &Cli) -> ClientConfig {
    ClientConfig {
        base_url: cli.base_url.trim_end_matches('/').to_owned(),
        credential_mode: cli.credential_mode,
        landing_route: DEFAULT_LANDING_ROUTE.to_owned(),
        login_route: DEFAULT_LOGIN_ROUTE.to_owned(),
        mirror_identity: true,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Api(error)) => {
            let payload = serde_json::to_string_pretty(&error.payload()).unwrap_or_else(|_| error.to_string());
            eprintln!("{payload}");
            ExitCode::FAILURE
        }
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let store = Arc::new(FileStore::open(&cli.session_file));
    let observer: Arc<dyn SessionObserver> = Arc::new(LogObserver);
    let session = Session::new(client_config(&cli), store, Some(observer))?;

    match cli.command {
        Command::Login { email, password } => {
            let identity = session.try_login(&email, &password).await?;
            print_json(&serde_json::to_value(identity)?)
        }
        Command::Signup { email, password, nickname, profile_image_url } => {
            let request = SignupRequest { email, password, nickname, profile_image_url };
            let outcome = session.signup(&request).await?;
            print_json(&serde_json::to_value(outcome)?)
        }
        Command::Logout => {
            session.logout().await;
            println!("logged out");
            Ok(())
        }
        Command::Whoami => {
            let identity = session.ensure_identity().await.ok_or(CliError::NotLoggedIn)?;
            print_json(&serde_json::to_value(identity)?)
        }
        command => {
            if !session.is_logged_in() {
                return Err(CliError::NotLoggedIn);
            }
            let json = run_resource(&session, command).await?;
            print_json(&json)
        }
    }
}

async fn run_resource(session: &Session, command: Command) -> Result<Value, CliError> {
    let json = match command {
        Command::Post(post) => run_post(session, post).await?,
        Command::Comment(comment) => run_comment(session, comment).await?,
        Command::User(user) => run_user(session, user).await?,
        Command::Image(ImageCommand { command: ImageSubcommand::Upload { files } }) => {
            let files = read_images(files).await?;
            let upload = session.images().upload(files).await?;
            serde_json::json!({ "urls": upload.urls })
        }
        Command::Login { .. } | Command::Signup { .. } | Command::Logout | Command::Whoami => Value::Null,
    };
    Ok(json)
}

async fn run_post(session: &Session, post: PostCommand) -> Result<Value, ApiError> {
    let posts = session.posts();
    match post.command {
        PostSubcommand::List { page, size } => posts.list(page, size).await,
        PostSubcommand::Read { post_id } => posts.get(post_id).await,
        PostSubcommand::Create(draft) => posts.create(&draft.into()).await,
        PostSubcommand::Update { post_id, draft } => posts.update(post_id, &draft.into()).await,
        PostSubcommand::Delete { post_id } => posts.delete(post_id).await,
        PostSubcommand::Like { post_id } => posts.like(post_id).await,
    }
}

async fn run_comment(session: &Session, comment: CommentCommand) -> Result<Value, ApiError> {
    let comments = session.comments();
    match comment.command {
        CommentSubcommand::List { post_id } => comments.list(post_id).await,
        CommentSubcommand::Create { post_id, body } => comments.create(post_id, &body).await,
        CommentSubcommand::Update { comment_id, body } => comments.update(comment_id, &body).await,
        CommentSubcommand::Delete { comment_id } => comments.delete(comment_id).await,
    }
}

async fn run_user(session: &Session, user: UserCommand) -> Result<Value, CliError> {
    let users = session.users();
    let json = match user.command {
        UserSubcommand::Profile => serde_json::to_value(users.profile().await?)?,
        UserSubcommand::Update { nickname, image } => {
            let image = match image {
                Some(path) => Some(read_image(path).await?),
                None => None,
            };
            session.update_profile(&nickname, image).await?
        }
        UserSubcommand::Deactivate => users.deactivate().await?,
        UserSubcommand::Password { new_password, confirm_password } => {
            users.change_password(&new_password, &confirm_password).await?
        }
    };
    Ok(json)
}

async fn read_image(path: PathBuf) -> Result<ImageFile, CliError> {
    ImageFile::from_path(&path)
        .await
        .map_err(|source| CliError::ReadFile { path, source })
}

async fn read_images(paths: Vec<PathBuf>) -> Result<Vec<ImageFile>, CliError> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(read_image(path).await?);
    }
    Ok(files)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;

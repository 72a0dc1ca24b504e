use super::*;

fn parse(args: &[&str]) -> Cli {
    let mut argv = vec!["postboard-cli"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap()
}

#[test]
fn login_accepts_password_flag() {
    let cli = parse(&["login", "--email", "a@b.test", "--password", "pw"]);
    match cli.command {
        Command::Login { email, password } => {
            assert_eq!(email, "a@b.test");
            assert_eq!(password, "pw");
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn credential_mode_flag_parses_cookie() {
    let cli = parse(&["--credential-mode", "cookie", "--base-url", "http://api.test/", "whoami"]);
    assert_eq!(cli.credential_mode, CredentialMode::Cookie);

    let config = client_config(&cli);
    assert_eq!(config.base_url, "http://api.test");
    assert!(config.mirror_identity);
}

#[test]
fn unknown_credential_mode_is_rejected() {
    let result = Cli::try_parse_from(["postboard-cli", "--credential-mode", "basic", "whoami"]);
    assert!(result.is_err());
}

#[test]
fn post_create_collects_repeated_image_urls() {
    let cli = parse(&["post", "create", "--title", "t", "--body", "b", "--image-url", "u1", "--image-url", "u2"]);
    let Command::Post(PostCommand { command: PostSubcommand::Create(args) }) = cli.command else {
        panic!("expected post create");
    };
    let draft = PostDraft::from(args);
    assert_eq!(draft.title, "t");
    assert_eq!(draft.image_urls, vec!["u1".to_owned(), "u2".to_owned()]);
}

#[test]
fn post_list_defaults_to_first_page() {
    let cli = parse(&["post", "list"]);
    let Command::Post(PostCommand { command: PostSubcommand::List { page, size } }) = cli.command else {
        panic!("expected post list");
    };
    assert_eq!(page, 0);
    assert_eq!(size, postboard::services::posts::DEFAULT_PAGE_SIZE);
}

#[test]
fn image_upload_requires_a_file() {
    assert!(Cli::try_parse_from(["postboard-cli", "image", "upload"]).is_err());
}

#[test]
fn comment_update_takes_id_and_body() {
    let cli = parse(&["comment", "update", "7", "--body", "edited"]);
    let Command::Comment(CommentCommand { command: CommentSubcommand::Update { comment_id, body } }) = cli.command
    else {
        panic!("expected comment update");
    };
    assert_eq!(comment_id, 7);
    assert_eq!(body, "edited");
}

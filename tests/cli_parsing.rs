use clap::Parser;
use questline::cli::commands::consume::StreamArg;
use questline::cli::commands::cursor::CursorCommands;
use questline::cli::commands::quest::QuestCommands;
use questline::cli::{Cli, Commands};

#[test]
fn test_parse_consume_jetstream_verbose() {
    let cli = Cli::try_parse_from(["questline", "consume", "jetstream", "-v"]).unwrap();
    assert!(cli.command.verbose());
    match cli.command {
        Commands::Consume(args) => assert!(matches!(args.stream, StreamArg::Jetstream)),
        other => panic!("Wrong command: {other:?}"),
    }
}

#[test]
fn test_parse_rejects_unknown_stream() {
    assert!(Cli::try_parse_from(["questline", "consume", "relay"]).is_err());
}

#[test]
fn test_parse_process_with_global_flags() {
    let cli = Cli::try_parse_from([
        "questline",
        "process",
        "--reply-uri",
        "at://did:plc:a/app.bsky.feed.post/r1",
        "--author-did",
        "did:plc:a",
        "--author-handle",
        "a.bsky.social",
        "--text",
        "hello",
        "--quest-uri",
        "at://did:plc:q/app.bsky.feed.post/1",
        "--json",
        "--config",
        "/etc/questline.yaml",
    ])
    .unwrap();

    assert!(cli.json);
    assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/etc/questline.yaml")));
    assert!(!cli.command.verbose());
    match cli.command {
        Commands::Process(args) => {
            assert_eq!(args.author_did, "did:plc:a");
            assert_eq!(args.text, "hello");
            assert!(args.created_at.is_none());
        }
        other => panic!("Wrong command: {other:?}"),
    }
}

#[test]
fn test_parse_process_requires_quest_uri() {
    let result = Cli::try_parse_from([
        "questline",
        "process",
        "--reply-uri",
        "at://did:plc:a/app.bsky.feed.post/r1",
        "--author-did",
        "did:plc:a",
        "--author-handle",
        "a.bsky.social",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_parse_quest_import_replace() {
    let cli = Cli::try_parse_from(["questline", "quest", "import", "quests.yaml", "--replace"]).unwrap();
    match cli.command {
        Commands::Quest(args) => match args.command {
            QuestCommands::Import { file, replace } => {
                assert_eq!(file.to_str(), Some("quests.yaml"));
                assert!(replace);
            }
            other => panic!("Wrong quest command: {other:?}"),
        },
        other => panic!("Wrong command: {other:?}"),
    }
}

#[test]
fn test_parse_cursor_show_optional_service() {
    let cli = Cli::try_parse_from(["questline", "cursor", "show"]).unwrap();
    match cli.command {
        Commands::Cursor(args) => {
            let CursorCommands::Show { service } = args.command;
            assert!(service.is_none());
        }
        other => panic!("Wrong command: {other:?}"),
    }
}

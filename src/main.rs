use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use coursemap::cli::{BookmarkCommand, Cli, Command, MindmapCommand};
use coursemap::commands;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    coursemap::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        Command::Stats(args) => commands::stats(args).await.context("stats")?,
        Command::Search(args) => commands::search(args).await.context("search")?,
        Command::Tree(args) => commands::tree(args).await.context("tree")?,
        Command::Flatten(args) => commands::flatten(args).await.context("flatten")?,
        Command::Show(args) => commands::show(args).await.context("show")?,
        Command::Mindmap {
            command: MindmapCommand::Export(args),
        } => {
            commands::mindmap_export(args)
                .await
                .context("mindmap export")?;
        }
        Command::Bookmark {
            command: BookmarkCommand::Add(args),
        } => {
            commands::bookmark_add(args).await.context("bookmark add")?;
        }
        Command::Bookmark {
            command: BookmarkCommand::Remove(args),
        } => {
            commands::bookmark_remove(args)
                .await
                .context("bookmark remove")?;
        }
        Command::Bookmark {
            command: BookmarkCommand::List(args),
        } => {
            commands::bookmark_list(args).await.context("bookmark list")?;
        }
        Command::Share(args) => commands::share(args).await.context("share")?,
    }

    Ok(())
}

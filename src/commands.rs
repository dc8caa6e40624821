use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;

use crate::app::bookmarks::BookmarkStore;
use crate::app::pane::ContentPane;
use crate::app::share::{
    CommandClipboard, NoSharePlatform, ShareOutcome, ShareRequest, share_with_fallback,
};
use crate::app::storage::LocalStore;
use crate::cli::{
    BookmarkArgs, BookmarkListArgs, CourseArgs, MindmapExportArgs, PaneFormat, SearchArgs,
    ShareArgs, ShowArgs, TreeArgs,
};
use crate::config::Settings;
use crate::content::{ContentStore, source_for};
use crate::events::{ContentSelection, EventBus};
use crate::formats::{Bookmark, Course, SectionRef};
use crate::mindmap::export::{self, default_file_name};
use crate::mindmap::{DEFAULT_SETTLE_TICKS, MindMap};
use crate::nav::NavigationTree;
use crate::search::{MAX_DISPLAYED_RESULTS, MIN_QUERY_CHARS, render_results};

async fn load(args: &CourseArgs) -> anyhow::Result<Arc<Course>> {
    let store = ContentStore::new(source_for(&args.course)?);
    let course = store
        .load()
        .await
        .with_context(|| format!("load course: {}", args.course))?;
    Ok(course)
}

fn data_dir(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(dir) => Ok(dir),
        None => Ok(Settings::from_env()?.data_dir),
    }
}

pub async fn stats(args: CourseArgs) -> anyhow::Result<()> {
    let course = load(&args).await?;
    let stats = course.stats();
    let mut out = std::io::stdout().lock();
    if !course.course_title.is_empty() {
        writeln!(out, "{}", course.course_title)?;
    }
    writeln!(out, "parts: {}", stats.parts)?;
    writeln!(out, "chapters: {}", stats.chapters)?;
    writeln!(out, "sections: {}", stats.sections)?;
    writeln!(out, "concepts: {}", stats.concepts)?;
    writeln!(out, "pages: {}", stats.pages)?;
    Ok(())
}

pub async fn search(args: SearchArgs) -> anyhow::Result<()> {
    let course = load(&args.course).await?;
    let query = args.query.trim();
    if query.chars().count() < MIN_QUERY_CHARS {
        anyhow::bail!("query must be at least {MIN_QUERY_CHARS} characters");
    }
    let results = course.search(query);

    let mut out = std::io::stdout().lock();
    if args.json {
        let view = render_results(&results, query);
        serde_json::to_writer_pretty(&mut out, &view).context("serialize search view")?;
        writeln!(out)?;
        return Ok(());
    }

    for result in results.iter().take(MAX_DISPLAYED_RESULTS) {
        writeln!(
            out,
            "[{}] Chapter {}: {} | {}",
            result.kind.as_str(),
            result.chapter_id,
            result.chapter_title,
            result.label
        )?;
        if result.context != result.label {
            writeln!(out, "    {}", result.context)?;
        }
    }
    if let Some(hidden) = results.len().checked_sub(MAX_DISPLAYED_RESULTS)
        && hidden > 0
    {
        writeln!(out, "... {hidden} more")?;
    }
    tracing::info!(query, total = results.len(), "search done");
    Ok(())
}

pub async fn tree(args: TreeArgs) -> anyhow::Result<()> {
    let course = load(&args.course).await?;
    let mut nav = NavigationTree::new(&course, EventBus::default());
    if args.expand_all {
        nav.expand_all();
    }
    print!("{}", nav.render_outline());
    Ok(())
}

pub async fn flatten(args: CourseArgs) -> anyhow::Result<()> {
    let course = load(&args).await?;
    let mut out = std::io::stdout().lock();
    for node in course.flatten() {
        serde_json::to_writer(&mut out, &node).context("serialize node")?;
        writeln!(out)?;
    }
    Ok(())
}

fn selection(
    chapter: u32,
    section: Option<&str>,
    takeaway: Option<usize>,
) -> anyhow::Result<ContentSelection> {
    Ok(match (section, takeaway) {
        (Some(raw), _) => ContentSelection::section(chapter, raw.parse::<SectionRef>()?),
        (None, Some(index)) => ContentSelection::takeaway(chapter, index),
        (None, None) => ContentSelection::chapter(chapter),
    })
}

pub async fn show(args: ShowArgs) -> anyhow::Result<()> {
    let course = load(&args.course).await?;
    let selection = selection(args.chapter, args.section.as_deref(), args.takeaway)?;
    let pane = ContentPane::resolve(&course, &selection)
        .ok_or_else(|| anyhow::anyhow!("no content for {selection:?}"))?;
    let rendered = match args.format {
        PaneFormat::Markdown => pane.render_markdown(),
        PaneFormat::Html => pane.render_html(),
    };
    print!("{rendered}");
    Ok(())
}

pub async fn mindmap_export(args: MindmapExportArgs) -> anyhow::Result<()> {
    let course = load(&args.course).await?;
    let mut map = MindMap::from_course(&course, args.layout, EventBus::default());
    if args.expand_all {
        map.expand_all();
    }
    for id in &args.expand {
        if map.node(id).is_none() {
            anyhow::bail!("unknown node: {id}");
        }
        if !map.is_expanded(id) {
            map.toggle(id);
        }
    }
    let ticks = map.settle(DEFAULT_SETTLE_TICKS);
    map.resize(args.width, args.height);
    map.reset_view();
    tracing::debug!(layout = map.layout_name(), ticks, "layout settled");

    let bytes = export::export(&map, args.format).context("render mind map")?;
    let out = args
        .out
        .unwrap_or_else(|| PathBuf::from(default_file_name(args.format)));
    export::write_export(&out, &bytes, args.force)
        .with_context(|| format!("write {}", out.display()))?;
    println!("{}", out.display());
    Ok(())
}

pub async fn bookmark_add(args: BookmarkArgs) -> anyhow::Result<()> {
    let course = load(&args.course).await?;
    let chapter = course
        .chapter(args.chapter)
        .ok_or_else(|| anyhow::anyhow!("unknown chapter: {}", args.chapter))?;
    let mut bookmarks = BookmarkStore::open(LocalStore::new(data_dir(args.data_dir)?)).await;
    let added = bookmarks
        .add(Bookmark {
            title: chapter.title.clone(),
            chapter: chapter.id,
        })
        .await
        .context("save bookmarks")?;
    if added {
        println!("bookmarked chapter {}: {}", chapter.id, chapter.title);
    } else {
        println!("chapter {} is already bookmarked", chapter.id);
    }
    Ok(())
}

pub async fn bookmark_remove(args: BookmarkArgs) -> anyhow::Result<()> {
    load(&args.course).await?;
    let mut bookmarks = BookmarkStore::open(LocalStore::new(data_dir(args.data_dir)?)).await;
    if bookmarks
        .remove(args.chapter)
        .await
        .context("save bookmarks")?
    {
        println!("removed bookmark for chapter {}", args.chapter);
    } else {
        println!("chapter {} was not bookmarked", args.chapter);
    }
    Ok(())
}

pub async fn bookmark_list(args: BookmarkListArgs) -> anyhow::Result<()> {
    load(&args.course).await?;
    let bookmarks = BookmarkStore::open(LocalStore::new(data_dir(args.data_dir)?)).await;
    let mut out = std::io::stdout().lock();
    for bookmark in bookmarks.list() {
        writeln!(out, "{}\t{}", bookmark.chapter, bookmark.title)?;
    }
    Ok(())
}

pub async fn share(args: ShareArgs) -> anyhow::Result<()> {
    let course = load(&args.course).await?;
    let pane = ContentPane::resolve(&course, &ContentSelection::chapter(args.chapter))
        .ok_or_else(|| anyhow::anyhow!("unknown chapter: {}", args.chapter))?;
    let request = ShareRequest::for_pane(&pane, &course.course_title, args.url.as_deref());

    match share_with_fallback(&NoSharePlatform, &CommandClipboard::default(), &request) {
        ShareOutcome::Shared => println!("shared"),
        ShareOutcome::Copied => println!("copied to clipboard"),
        // Clipboard failures are not fatal; print what would have been copied.
        ShareOutcome::Failed => println!("{}", request.to_clipboard_text()),
    }
    Ok(())
}

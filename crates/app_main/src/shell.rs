//! Interactive line shell over the file client

use anyhow::{anyhow, bail, Context, Result};
use app_core::{
    highlight, render_archive_tree, CarouselKey, FileClient, ImageCarousel, PreviewContent, RemotePath,
    Route, Segment, SortColumn, SortOrder, UploadId,
};
use app_proto::{FileStat, SearchResult};
use bytes::Bytes;
use bytesize::ByteSize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// How long a navigation command waits for its listing before giving up
const LISTING_WAIT: Duration = Duration::from_secs(10);

const HELP: &str = "\
login <name> <password>    log in
logout                     log out
passwd <old> <new>         change password
ls                         list the current directory
cd <dir>                   enter a directory (absolute with a leading /)
up | back | forward        move through the tree and history
crumb <n>                  jump to breadcrumb n (0 is the root)
sort name|created|size     cycle the sort on a column
open <name>                preview a file or enter a directory
close                      leave the preview
next | prev | thumb <n>    step through images
search <keyword>           search file names
hit <n>                    open search result n
upload <local path>        upload a local file here
uploads                    show running uploads
cancel <id>                cancel an upload
rm <name> | mkdir <name>   delete or create
link <name>                print a download link
zip <name>                 print a compressed download link
aria2 on|off|url <url>     aria2 download settings
recent                     recently opened folders
help | quit";

/// Aria2 settings change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aria2Setting {
    On,
    Off,
    RpcUrl(String),
}

/// One parsed shell line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Login { name: String, password: String },
    Logout,
    ResetPassword { old: String, new: String },
    List,
    Cd(String),
    Up,
    Back,
    Forward,
    Crumb(usize),
    Sort(SortColumn),
    Open(String),
    Close,
    Next,
    Prev,
    Thumb(usize),
    Search(String),
    Hit(usize),
    Upload(PathBuf),
    Uploads,
    Cancel(UploadId),
    Remove(String),
    Mkdir(String),
    Link(String),
    ZipLink(String),
    Aria2(Aria2Setting),
    Recent,
    Help,
    Quit,
}

/// Parse one input line; blank lines yield `None`
///
/// Names may contain spaces; everything after the command word is taken
/// as the argument.
pub fn parse(line: &str) -> Result<Option<ShellCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word {
        "login" => {
            let (name, password) = two_args(rest, "login <name> <password>")?;
            ShellCommand::Login { name, password }
        }
        "logout" => ShellCommand::Logout,
        "passwd" => {
            let (old, new) = two_args(rest, "passwd <old> <new>")?;
            ShellCommand::ResetPassword { old, new }
        }
        "ls" => ShellCommand::List,
        "cd" => ShellCommand::Cd(required(rest, "cd <dir>")?),
        "up" | ".." => ShellCommand::Up,
        "back" => ShellCommand::Back,
        "forward" => ShellCommand::Forward,
        "crumb" => ShellCommand::Crumb(number(rest, "crumb <n>")?),
        "sort" => ShellCommand::Sort(match rest {
            "name" => SortColumn::Name,
            "created" => SortColumn::Created,
            "size" => SortColumn::Size,
            _ => bail!("usage: sort name|created|size"),
        }),
        "open" => ShellCommand::Open(required(rest, "open <name>")?),
        "close" => ShellCommand::Close,
        "next" => ShellCommand::Next,
        "prev" => ShellCommand::Prev,
        "thumb" => ShellCommand::Thumb(number(rest, "thumb <n>")?),
        "search" => ShellCommand::Search(rest.to_string()),
        "hit" => ShellCommand::Hit(number(rest, "hit <n>")?),
        "upload" => ShellCommand::Upload(PathBuf::from(required(rest, "upload <local path>")?)),
        "uploads" => ShellCommand::Uploads,
        "cancel" => ShellCommand::Cancel(number(rest, "cancel <id>")?),
        "rm" => ShellCommand::Remove(required(rest, "rm <name>")?),
        "mkdir" => ShellCommand::Mkdir(required(rest, "mkdir <name>")?),
        "link" => ShellCommand::Link(required(rest, "link <name>")?),
        "zip" => ShellCommand::ZipLink(required(rest, "zip <name>")?),
        "aria2" => ShellCommand::Aria2(match rest.split_once(char::is_whitespace) {
            None if rest == "on" => Aria2Setting::On,
            None if rest == "off" => Aria2Setting::Off,
            Some(("url", url)) => Aria2Setting::RpcUrl(url.trim().to_string()),
            _ => bail!("usage: aria2 on|off|url <url>"),
        }),
        "recent" => ShellCommand::Recent,
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" => ShellCommand::Quit,
        other => bail!("unknown command '{}' (try 'help')", other),
    };
    Ok(Some(command))
}

fn required(rest: &str, usage: &str) -> Result<String> {
    if rest.is_empty() {
        bail!("usage: {}", usage);
    }
    Ok(rest.to_string())
}

fn two_args(rest: &str, usage: &str) -> Result<(String, String)> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) => Ok((a.to_string(), b.to_string())),
        _ => bail!("usage: {}", usage),
    }
}

fn number<T: std::str::FromStr>(rest: &str, usage: &str) -> Result<T> {
    rest.parse().map_err(|_| anyhow!("usage: {}", usage))
}

/// `[keyword]` around each match
pub fn render_highlight(name: &str, keyword: &str) -> String {
    highlight(name, keyword)
        .into_iter()
        .map(|segment| match segment {
            Segment::Literal(text) => text.to_string(),
            Segment::Highlight(text) => format!("[{}]", text),
        })
        .collect()
}

fn render_entry(file: &FileStat) -> String {
    let created = chrono::DateTime::from_timestamp_millis(file.created as i64)
        .filter(|_| file.created > 0)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    if file.is_dir() {
        format!("{:>10}  {:16}  {}/", "", created, file.name)
    } else {
        format!("{:>10}  {:16}  {}", ByteSize::b(file.size).to_string(), created, file.name)
    }
}

struct Shell {
    client: Arc<FileClient>,
    carousel: Option<ImageCarousel>,
    hits: Vec<SearchResult>,
}

/// Read commands from stdin until `quit` or end of input
pub async fn run(client: Arc<FileClient>) -> Result<()> {
    client
        .preview()
        .set_previewing_callback(Arc::new(|file: &FileStat| println!("previewing {}", file.name)));

    let mut shell = Shell {
        client,
        carousel: None,
        hits: Vec::new(),
    };
    if let Err(e) = shell.settle_listing().await {
        println!("error: {}", e);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        shell.print_prompt();
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };

        let command = match parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        if command == ShellCommand::Quit {
            break;
        }

        if let Err(e) = shell.execute(command).await {
            match e.downcast_ref::<app_core::AppError>() {
                Some(app_err) => println!("error: {}", app_err.user_message()),
                None => println!("error: {}", e),
            }
        }
    }

    tracing::info!("Shell closed");
    Ok(())
}

impl Shell {
    fn print_prompt(&self) {
        use std::io::Write;

        let snapshot = self.client.store().snapshot();
        let marker = match snapshot.route {
            Route::Files => "",
            Route::Login => " (login required)",
        };
        print!("/{}{}> ", snapshot.path, marker);
        let _ = std::io::stdout().flush();
    }

    async fn execute(&mut self, command: ShellCommand) -> Result<()> {
        let navigator = self.client.navigator().clone();

        match command {
            ShellCommand::Login { name, password } => {
                if self.client.login(&name, &password).await? {
                    println!("logged in");
                    self.settle_listing().await?;
                } else {
                    println!("login refused");
                }
            }
            ShellCommand::Logout => {
                if self.client.session().logout().await? {
                    println!("logged out");
                }
            }
            ShellCommand::ResetPassword { old, new } => {
                let ok = self.client.session().reset_password(&old, &new).await?;
                println!("{}", if ok { "password changed" } else { "password not changed" });
            }
            ShellCommand::List => self.print_listing(),
            ShellCommand::Cd(dir) => {
                let target = match dir.strip_prefix('/') {
                    Some(absolute) => RemotePath::new(absolute),
                    None => navigator.current_path().join(&dir),
                };
                self.leave_preview();
                navigator.navigate(target);
                self.settle_listing().await?;
            }
            ShellCommand::Up => {
                self.leave_preview();
                if navigator.go_up() {
                    self.settle_listing().await?;
                }
            }
            ShellCommand::Back => {
                self.carousel = None;
                if navigator.go_back() {
                    self.restore_entry().await?;
                }
            }
            ShellCommand::Forward => {
                self.carousel = None;
                if navigator.go_forward() {
                    self.restore_entry().await?;
                }
            }
            ShellCommand::Recent => {
                for (i, folder) in self.client.config().recent_folders.iter().enumerate() {
                    println!("{:>3}  /{}", i, folder);
                }
            }
            ShellCommand::Crumb(index) => {
                self.leave_preview();
                if navigator.open_breadcrumb(index) {
                    self.settle_listing().await?;
                } else {
                    bail!("no breadcrumb {}", index);
                }
            }
            ShellCommand::Sort(column) => {
                match navigator.click_sort(column) {
                    Some((column, SortOrder::Ascending)) => println!("sorted by {:?} ascending", column),
                    Some((column, SortOrder::Descending)) => println!("sorted by {:?} descending", column),
                    None => println!("server order"),
                }
                self.print_listing();
            }
            ShellCommand::Open(name) => {
                let file = navigator
                    .directory()
                    .listing
                    .into_iter()
                    .find(|f| f.name == name)
                    .ok_or_else(|| anyhow!("no entry named '{}'", name))?;
                self.client.preview().select(&file);
                if file.is_dir() {
                    self.settle_listing().await?;
                } else {
                    self.show_preview().await?;
                }
            }
            ShellCommand::Close => {
                self.carousel = None;
                if !self.client.preview().close() {
                    println!("nothing to close");
                }
            }
            ShellCommand::Next => self.step(|c| c.key(CarouselKey::Right))?,
            ShellCommand::Prev => self.step(|c| c.key(CarouselKey::Left))?,
            ShellCommand::Thumb(index) => self.step(|c| c.click_thumbnail(index))?,
            ShellCommand::Search(keyword) => {
                let search = self.client.search();
                search.set_keyword(&keyword);
                let state = search.settled().await;
                if let Some(error) = state.error {
                    bail!(error);
                }
                for (i, hit) in state.results.iter().enumerate() {
                    let suffix = if hit.is_dir { "/" } else { "" };
                    println!(
                        "{:>3}  {}{}  ({})",
                        i,
                        render_highlight(&hit.file_name, &state.keyword),
                        suffix,
                        hit.file_path
                    );
                }
                self.hits = state.results;
            }
            ShellCommand::Hit(index) => {
                let hit = self.hits.get(index).cloned().ok_or_else(|| anyhow!("no result {}", index))?;
                self.client.search().set_keyword("");
                self.client.preview().open_search_result(&hit);
                if hit.is_dir {
                    self.settle_listing().await?;
                } else {
                    self.show_preview().await?;
                }
            }
            ShellCommand::Upload(local) => {
                let name = local
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| anyhow!("'{}' has no file name", local.display()))?
                    .to_string();
                let data = tokio::fs::read(&local)
                    .await
                    .with_context(|| format!("Failed to read {}", local.display()))?;
                let handle = self
                    .client
                    .uploads()
                    .start(&navigator.current_path(), &name, Bytes::from(data));
                println!("upload {} started", handle.id);

                let id = handle.id;
                tokio::spawn(async move {
                    match handle.join.await {
                        Ok(Ok(true)) => println!("\nupload {} done", id),
                        Ok(Ok(false)) => println!("\nupload {} refused", id),
                        Ok(Err(e)) => println!("\nupload {} failed: {}", id, e.user_message()),
                        Err(_) => println!("\nupload {} cancelled", id),
                    }
                });
            }
            ShellCommand::Uploads => {
                let tasks = self.client.uploads().tasks();
                if tasks.is_empty() {
                    println!("no uploads");
                }
                for task in tasks {
                    println!(
                        "{:>3}  {:>5.1}%  {:>12}  {}",
                        task.id,
                        task.fraction() * 100.0,
                        task.speed(),
                        task.label
                    );
                }
            }
            ShellCommand::Cancel(id) => {
                if !self.client.uploads().cancel(id) {
                    bail!("no upload {}", id);
                }
            }
            ShellCommand::Remove(name) => {
                if !navigator.delete(&name).await? {
                    println!("delete refused");
                }
            }
            ShellCommand::Mkdir(name) => {
                if !navigator.create_dir(&name).await? {
                    println!("create refused");
                }
            }
            ShellCommand::Link(name) => println!("{}", navigator.download_link(&name)?),
            ShellCommand::ZipLink(name) => println!("{}", navigator.compressed_download_link(&name)?),
            ShellCommand::Aria2(setting) => {
                self.client.update_config(|config| match &setting {
                    Aria2Setting::On => config.enable_aria2(),
                    Aria2Setting::Off => config.disable_aria2(),
                    Aria2Setting::RpcUrl(url) => config.set_aria2_rpc_url(url),
                })?;
                let download = self.client.config().download;
                println!(
                    "aria2 {} ({})",
                    if download.aria2_enabled { "on" } else { "off" },
                    download.aria2_rpc_url
                );
            }
            ShellCommand::Help => println!("{}", HELP),
            ShellCommand::Quit => {}
        }
        Ok(())
    }

    fn leave_preview(&mut self) {
        self.carousel = None;
        self.client.preview().close();
    }

    // Moves are reported by the previewing callback
    fn step(&mut self, action: impl FnOnce(&mut ImageCarousel) -> bool) -> Result<()> {
        let carousel = self.carousel.as_mut().ok_or_else(|| anyhow!("no image preview open"))?;
        if !action(carousel) {
            println!("{} ({}/{})", carousel.current().name, carousel.index() + 1, carousel.len());
        }
        Ok(())
    }

    async fn show_preview(&mut self) -> Result<()> {
        let selection = self
            .client
            .preview()
            .current()
            .ok_or_else(|| anyhow!("nothing selected"))?;
        let content = self.client.preview().load(&selection).await?;

        self.carousel = None;
        match content {
            PreviewContent::Image(carousel) => {
                for (i, image) in carousel.images().iter().enumerate() {
                    let marker = if i == carousel.index() { '*' } else { ' ' };
                    println!("{} {:>3}  {}", marker, i, image.name);
                }
                self.carousel = Some(carousel);
            }
            PreviewContent::Text(text) => println!("{}", text),
            PreviewContent::Video { url } => println!("video: {}", url),
            PreviewContent::Archive(root) => {
                for line in render_archive_tree(&root) {
                    println!("{}", line);
                }
            }
            PreviewContent::Unsupported { download } => {
                println!("no preview available, download: {}", download)
            }
        }
        Ok(())
    }

    /// Show a history entry: its listing, then its preview if it had one
    async fn restore_entry(&mut self) -> Result<()> {
        self.settle_listing().await?;
        if self.client.preview().current().is_some() {
            self.show_preview().await?;
        }
        Ok(())
    }

    async fn settle_listing(&self) -> Result<()> {
        self.wait_for_listing().await?;
        self.print_listing();
        Ok(())
    }

    /// Wait until the reload of the current path has finished
    ///
    /// A refused or failed reload is reported as an error; the previous
    /// listing is still shown by `ls`.
    async fn wait_for_listing(&self) -> Result<()> {
        let navigator = self.client.navigator();
        let target = navigator.current_path();
        let mut rx = navigator.subscribe();

        let failure = {
            let settled = tokio::time::timeout(LISTING_WAIT, rx.wait_for(|dir| dir.settled_for(&target)))
                .await
                .map_err(|_| anyhow!("timed out loading /{}", target))?
                .map_err(|_| anyhow!("navigator stopped"))?;
            settled.failure_for(&target).map(str::to_string)
        };
        match failure {
            Some(message) => bail!("cannot open /{}: {}", target, message),
            None => Ok(()),
        }
    }

    fn print_listing(&self) {
        let navigator = self.client.navigator();
        let crumbs: Vec<String> = navigator
            .breadcrumbs()
            .into_iter()
            .enumerate()
            .map(|(i, crumb)| format!("{}:{}", i, crumb.label.unwrap_or_else(|| "/".to_string())))
            .collect();
        println!("{}", crumbs.join(" > "));
        for file in navigator.sorted_listing() {
            println!("{}", render_entry(&file));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(line: &str) -> ShellCommand {
        parse(line).unwrap().unwrap()
    }

    #[test]
    fn test_parse_blank_line() {
        assert!(parse("").unwrap().is_none());
        assert!(parse("   \t").unwrap().is_none());
    }

    #[test]
    fn test_parse_names_keep_spaces() {
        assert_eq!(parsed("cd  My Photos "), ShellCommand::Cd("My Photos".into()));
        assert_eq!(parsed("open holiday 2024.png"), ShellCommand::Open("holiday 2024.png".into()));
        assert_eq!(
            parsed("upload /tmp/a b.txt"),
            ShellCommand::Upload(PathBuf::from("/tmp/a b.txt"))
        );
    }

    #[test]
    fn test_parse_login() {
        assert_eq!(
            parsed("login admin secret"),
            ShellCommand::Login {
                name: "admin".into(),
                password: "secret".into()
            }
        );
        assert!(parse("login admin").is_err());
        assert!(parse("login a b c").is_err());
    }

    #[test]
    fn test_parse_numbers_and_choices() {
        assert_eq!(parsed("crumb 2"), ShellCommand::Crumb(2));
        assert_eq!(parsed("cancel 7"), ShellCommand::Cancel(7));
        assert_eq!(parsed("sort size"), ShellCommand::Sort(SortColumn::Size));
        assert!(parse("sort color").is_err());
        assert!(parse("hit x").is_err());
        assert!(parse("thumb").is_err());
    }

    #[test]
    fn test_parse_aria2() {
        assert_eq!(parsed("aria2 on"), ShellCommand::Aria2(Aria2Setting::On));
        assert_eq!(parsed("aria2 off"), ShellCommand::Aria2(Aria2Setting::Off));
        assert_eq!(
            parsed("aria2 url http://localhost:6800/jsonrpc"),
            ShellCommand::Aria2(Aria2Setting::RpcUrl("http://localhost:6800/jsonrpc".into()))
        );
        assert!(parse("aria2 maybe").is_err());
    }

    #[test]
    fn test_parse_search_allows_empty_keyword() {
        assert_eq!(parsed("search"), ShellCommand::Search(String::new()));
        assert_eq!(parsed("search rep"), ShellCommand::Search("rep".into()));
    }

    #[test]
    fn test_parse_recent() {
        assert_eq!(parsed("recent"), ShellCommand::Recent);
    }

    #[test]
    fn test_parse_unknown() {
        let err = parse("frobnicate").unwrap_err();
        assert!(err.to_string().contains("frobnicate"));
    }

    #[test]
    fn test_render_highlight() {
        assert_eq!(render_highlight("report_final_report.txt", "report"), "[report]_final_[report].txt");
        assert_eq!(render_highlight("abc", ""), "abc");
    }
}

//! Sandboxed text-file tools.

use std::{io, sync::Arc};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::fs;
use tracing::{debug, info};

use super::{Confirm, Sandbox, Tool, ToolError, flag_arg, required_string_arg, string_arg};
use crate::dispatch::{CONFIRM_PROMPT, CallContext};

/// Placeholder content for a path that does not exist.
pub const MISSING: &str = "<missing>";

/// Placeholder content when `list_files` targets something other than a
/// directory.
pub const NOT_A_DIRECTORY: &str = "<not a directory>";

/// The four file tools, in the order `tools/list` reports them.
#[must_use]
pub fn file_tools(sandbox: &Sandbox) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ListFiles(sandbox.clone())),
        Arc::new(ReadText(sandbox.clone())),
        Arc::new(WriteText(sandbox.clone())),
        Arc::new(DeleteFile(sandbox.clone())),
    ]
}

/// `list_files {dir="."}`: one level of a directory.
#[derive(Clone, Debug)]
pub struct ListFiles(pub Sandbox);

/// `read_text {path}`: a UTF-8 file's contents.
#[derive(Clone, Debug)]
pub struct ReadText(pub Sandbox);

/// `write_text {path, content, overwrite=false}`: create or replace a file,
/// confirming with the peer before replacing.
#[derive(Clone, Debug)]
pub struct WriteText(pub Sandbox);

/// `delete_file {path, force=false}`: remove a file, confirming with the peer
/// unless forced.
#[derive(Clone, Debug)]
pub struct DeleteFile(pub Sandbox);

#[async_trait]
impl Tool for ListFiles {
    fn name(&self) -> &str { "list_files" }

    fn description(&self) -> &str {
        "List one level of files relative to the server base directory."
    }

    async fn call(&self, arguments: Map<String, Value>, _ctx: &CallContext<'_>) -> Result<Value, ToolError> {
        list(&self.0, &arguments).await
    }
}

#[async_trait]
impl Tool for ReadText {
    fn name(&self) -> &str { "read_text" }

    fn description(&self) -> &str { "Read a UTF-8 encoded text file." }

    async fn call(&self, arguments: Map<String, Value>, _ctx: &CallContext<'_>) -> Result<Value, ToolError> {
        read(&self.0, &arguments).await
    }
}

#[async_trait]
impl Tool for WriteText {
    fn name(&self) -> &str { "write_text" }

    fn description(&self) -> &str {
        "Write a UTF-8 text file. The client is asked before an existing file is replaced unless \
         overwrite is true."
    }

    async fn call(&self, arguments: Map<String, Value>, ctx: &CallContext<'_>) -> Result<Value, ToolError> {
        write(&self.0, &arguments, ctx).await
    }
}

#[async_trait]
impl Tool for DeleteFile {
    fn name(&self) -> &str { "delete_file" }

    fn description(&self) -> &str {
        "Delete a file relative to the base directory after confirmation."
    }

    async fn call(&self, arguments: Map<String, Value>, ctx: &CallContext<'_>) -> Result<Value, ToolError> {
        delete(&self.0, &arguments, ctx).await
    }
}

#[derive(Debug, Serialize)]
struct Entry {
    path: String,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes: Option<u64>,
}

async fn metadata_if_exists(path: &std::path::Path) -> Result<Option<std::fs::Metadata>, ToolError> {
    match fs::metadata(path).await {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub(super) async fn list(sandbox: &Sandbox, arguments: &Map<String, Value>) -> Result<Value, ToolError> {
    let dir = string_arg(arguments, "dir")?
        .filter(|d| !d.trim().is_empty())
        .unwrap_or(".");
    let path = sandbox.resolve(dir)?;
    let shown = sandbox.relative(&path);
    let placeholder = match metadata_if_exists(&path).await? {
        None => Some(MISSING),
        Some(metadata) if !metadata.is_dir() => Some(NOT_A_DIRECTORY),
        Some(_) => None,
    };
    if let Some(content) = placeholder {
        return Ok(json!({ "dir": shown, "entries": [], "content": content }));
    }

    let mut entries = Vec::new();
    let mut reader = fs::read_dir(&path).await?;
    while let Some(entry) = reader.next_entry().await? {
        let file_type = entry.file_type().await?;
        let (kind, bytes) = if file_type.is_dir() {
            ("dir", None)
        } else {
            let kind = if file_type.is_file() { "file" } else { "other" };
            (kind, entry.metadata().await.ok().map(|m| m.len()))
        };
        entries.push(Entry {
            path: sandbox.relative(&entry.path()),
            kind,
            bytes,
        });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    let content = entries
        .iter()
        .map(|e| e.path.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    debug!("listed directory: dir={shown} entries={}", entries.len());
    Ok(json!({ "dir": shown, "entries": entries, "content": content }))
}

pub(super) async fn read(sandbox: &Sandbox, arguments: &Map<String, Value>) -> Result<Value, ToolError> {
    let requested = required_string_arg(arguments, "path")?;
    let path = sandbox.resolve(requested)?;
    let shown = sandbox.relative(&path);
    match metadata_if_exists(&path).await? {
        None => Ok(json!({ "path": shown, "content": MISSING })),
        Some(metadata) if !metadata.is_file() => Err(ToolError::NotRegularFile(shown)),
        Some(_) => {
            let content = fs::read_to_string(&path).await?;
            Ok(json!({ "path": shown, "content": content }))
        }
    }
}

pub(super) async fn write(
    sandbox: &Sandbox,
    arguments: &Map<String, Value>,
    confirm: &dyn Confirm,
) -> Result<Value, ToolError> {
    let requested = required_string_arg(arguments, "path")?;
    let content = string_arg(arguments, "content")?.unwrap_or_default();
    let overwrite = flag_arg(arguments, "overwrite")?;
    let path = sandbox.resolve(requested)?;
    let shown = sandbox.relative(&path);

    let existed = match metadata_if_exists(&path).await? {
        Some(metadata) if !metadata.is_file() => return Err(ToolError::NotRegularFile(shown)),
        Some(_) => true,
        None => false,
    };
    if existed && !overwrite && !confirm.confirm(CONFIRM_PROMPT).await? {
        info!("overwrite declined: path={shown}");
        return Ok(json!({
            "path": shown,
            "status": "skipped",
            "summary": format!("Skipped {shown}: overwrite declined"),
        }));
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(&path, content).await?;
    let status = if existed { "updated" } else { "created" };
    info!("wrote file: path={shown} status={status} bytes={}", content.len());
    Ok(json!({
        "path": shown,
        "status": status,
        "summary": format!("Wrote {} bytes to {shown}", content.len()),
    }))
}

pub(super) async fn delete(
    sandbox: &Sandbox,
    arguments: &Map<String, Value>,
    confirm: &dyn Confirm,
) -> Result<Value, ToolError> {
    let requested = required_string_arg(arguments, "path")?;
    let force = flag_arg(arguments, "force")?;
    let path = sandbox.resolve(requested)?;
    let shown = sandbox.relative(&path);

    match metadata_if_exists(&path).await? {
        None => return Err(ToolError::NotFound(shown)),
        Some(metadata) if !metadata.is_file() => return Err(ToolError::NotRegularFile(shown)),
        Some(_) => {}
    }
    if !force && !confirm.confirm(&format!("Delete {shown}?")).await? {
        info!("delete declined: path={shown}");
        return Ok(json!({
            "path": shown,
            "status": "skipped",
            "summary": format!("Skipped {shown}: delete declined"),
        }));
    }

    fs::remove_file(&path).await?;
    info!("deleted file: path={shown}");
    Ok(json!({
        "path": shown,
        "status": "deleted",
        "summary": format!("Deleted {shown}"),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;
    use crate::error::CallError;

    /// Scripted peer answer that records every prompt.
    struct Answer {
        accept: bool,
        prompts: Mutex<Vec<String>>,
    }

    impl Answer {
        fn new(accept: bool) -> Self {
            Self {
                accept,
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> { self.prompts.lock().expect("lock").clone() }
    }

    #[async_trait]
    impl Confirm for Answer {
        async fn confirm(&self, prompt: &str) -> Result<bool, CallError> {
            self.prompts.lock().expect("lock").push(prompt.to_owned());
            Ok(self.accept)
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[fixture]
    fn sandbox() -> (TempDir, Sandbox) {
        let dir = tempfile::tempdir().expect("tempdir");
        let sandbox = Sandbox::open(dir.path()).expect("sandbox");
        (dir, sandbox)
    }

    #[rstest]
    #[tokio::test]
    async fn lists_sorted_entries(sandbox: (TempDir, Sandbox)) {
        let (dir, sandbox) = sandbox;
        std::fs::write(dir.path().join("b.txt"), "bb").expect("write");
        std::fs::write(dir.path().join("a.txt"), "a").expect("write");
        std::fs::create_dir(dir.path().join("sub")).expect("mkdir");

        let listing = list(&sandbox, &Map::new()).await.expect("list");
        assert_eq!(listing["dir"], ".");
        assert_eq!(listing["content"], "a.txt\nb.txt\nsub");
        assert_eq!(listing["entries"][0], json!({"path": "a.txt", "type": "file", "bytes": 1}));
        assert_eq!(listing["entries"][2], json!({"path": "sub", "type": "dir"}));
    }

    #[rstest]
    #[case("nope", MISSING)]
    #[case("file.txt", NOT_A_DIRECTORY)]
    #[tokio::test]
    async fn lists_placeholders(sandbox: (TempDir, Sandbox), #[case] dir: &str, #[case] content: &str) {
        let (root, sandbox) = sandbox;
        std::fs::write(root.path().join("file.txt"), "x").expect("write");
        let listing = list(&sandbox, &args(json!({"dir": dir}))).await.expect("list");
        assert_eq!(listing["content"], content);
    }

    #[rstest]
    #[tokio::test]
    async fn reads_text_and_reports_missing(sandbox: (TempDir, Sandbox)) {
        let (dir, sandbox) = sandbox;
        std::fs::write(dir.path().join("hello.txt"), "hi there").expect("write");

        let found = read(&sandbox, &args(json!({"path": "hello.txt"}))).await.expect("read");
        assert_eq!(found, json!({"path": "hello.txt", "content": "hi there"}));
        let missing = read(&sandbox, &args(json!({"path": "gone.txt"}))).await.expect("read");
        assert_eq!(missing["content"], MISSING);
        assert!(matches!(
            read(&sandbox, &Map::new()).await,
            Err(ToolError::MissingArgument("path"))
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn rejects_escaping_paths(sandbox: (TempDir, Sandbox)) {
        let (_dir, sandbox) = sandbox;
        let err = read(&sandbox, &args(json!({"path": "../secret"})))
            .await
            .expect_err("escape");
        assert!(matches!(err, ToolError::PathEscapes(_)));
    }

    #[rstest]
    #[tokio::test]
    async fn creates_new_file_without_prompting(sandbox: (TempDir, Sandbox)) {
        let (dir, sandbox) = sandbox;
        let answer = Answer::new(false);
        let result = write(
            &sandbox,
            &args(json!({"path": "notes/new.txt", "content": "fresh"})),
            &answer,
        )
        .await
        .expect("write");
        assert_eq!(result["status"], "created");
        assert_eq!(result["path"], "notes/new.txt");
        assert!(answer.prompts().is_empty());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("notes/new.txt")).expect("read"),
            "fresh"
        );
    }

    #[rstest]
    #[case::declined(false, json!({}), "skipped", "old", 1)]
    #[case::accepted(true, json!({}), "updated", "new", 1)]
    #[case::preauthorised(false, json!({"overwrite": true}), "updated", "new", 0)]
    #[tokio::test]
    async fn overwrites_follow_confirmation(
        sandbox: (TempDir, Sandbox),
        #[case] accept: bool,
        #[case] extra: Value,
        #[case] status: &str,
        #[case] contents: &str,
        #[case] prompts: usize,
    ) {
        let (dir, sandbox) = sandbox;
        std::fs::write(dir.path().join("f.txt"), "old").expect("write");
        let mut arguments = args(json!({"path": "f.txt", "content": "new"}));
        arguments.extend(args(extra));
        let answer = Answer::new(accept);

        let result = write(&sandbox, &arguments, &answer).await.expect("write");
        assert_eq!(result["status"], status);
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).expect("read"), contents);
        let asked = answer.prompts();
        assert_eq!(asked.len(), prompts);
        assert!(asked.iter().all(|p| p == CONFIRM_PROMPT));
    }

    #[rstest]
    #[tokio::test]
    async fn writing_over_a_directory_fails(sandbox: (TempDir, Sandbox)) {
        let (dir, sandbox) = sandbox;
        std::fs::create_dir(dir.path().join("d")).expect("mkdir");
        let err = write(&sandbox, &args(json!({"path": "d", "content": "x"})), &Answer::new(true))
            .await
            .expect_err("directory");
        assert!(matches!(err, ToolError::NotRegularFile(p) if p == "d"));
    }

    #[rstest]
    #[case::declined(false, false, "skipped", true)]
    #[case::confirmed(true, false, "deleted", false)]
    #[case::forced(false, true, "deleted", false)]
    #[tokio::test]
    async fn deletes_follow_confirmation(
        sandbox: (TempDir, Sandbox),
        #[case] accept: bool,
        #[case] force: bool,
        #[case] status: &str,
        #[case] survives: bool,
    ) {
        let (dir, sandbox) = sandbox;
        std::fs::write(dir.path().join("f.txt"), "x").expect("write");
        let answer = Answer::new(accept);

        let result = delete(&sandbox, &args(json!({"path": "f.txt", "force": force})), &answer)
            .await
            .expect("delete");
        assert_eq!(result["status"], status);
        assert_eq!(dir.path().join("f.txt").exists(), survives);
        let expected: Vec<String> = if force { vec![] } else { vec!["Delete f.txt?".into()] };
        assert_eq!(answer.prompts(), expected);
    }

    #[rstest]
    #[tokio::test]
    async fn deleting_missing_file_fails(sandbox: (TempDir, Sandbox)) {
        let (_dir, sandbox) = sandbox;
        let err = delete(&sandbox, &args(json!({"path": "nope"})), &Answer::new(true))
            .await
            .expect_err("missing");
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}

//! Script job handlers: `read_script`, `write_script`, `get_script_lines`
//! and `patch_script`, over any [`ScriptHost`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use script_patch::{Document, PatchRequest};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::cache::InstanceCache;
use crate::handler::{HandlerOutcome, HandlerRegistry, JobHandler};

pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Opaque host reference to a script object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptHandle(pub u64);

/// How a job names its target: a debug id from an earlier reply, or a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceRef {
    Id(String),
    Path(Vec<String>),
}

impl InstanceRef {
    /// Reads `id`, then `pathArray`, then dot-separated `path`.
    pub fn from_args(args: &Value) -> Result<Self, Value> {
        if let Some(id) = args.get("id").and_then(Value::as_str) {
            return Ok(InstanceRef::Id(id.to_string()));
        }
        if let Some(items) = args.get("pathArray").and_then(Value::as_array) {
            let segments: Option<Vec<String>> = items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect();
            return match segments {
                Some(segments) if !segments.is_empty() => Ok(InstanceRef::Path(segments)),
                _ => Err(invalid_args("pathArray must be a non-empty list of names")),
            };
        }
        match args.get("path").and_then(Value::as_str) {
            Some(path) if !path.is_empty() => Ok(InstanceRef::Path(
                path.split('.').map(str::to_string).collect(),
            )),
            _ => Err(invalid_args("one of id, pathArray or path is required")),
        }
    }

    pub fn cache_key(&self) -> String {
        match self {
            InstanceRef::Id(id) => format!("id:{id}"),
            InstanceRef::Path(segments) => format!("path:{}", segments.join(".")),
        }
    }
}

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceRef::Id(id) => write!(f, "#{id}"),
            InstanceRef::Path(segments) => f.write_str(&segments.join(".")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptHostError {
    #[error("script no longer exists")]
    Gone,
    #[error("{0}")]
    Host(String),
}

/// The host object model as far as script jobs need it.
pub trait ScriptHost: Send + Sync + 'static {
    fn resolve(&self, target: &InstanceRef) -> Option<ScriptHandle>;
    fn is_alive(&self, handle: ScriptHandle) -> bool;
    /// Current full path of a live script; moves when it is renamed or
    /// reparented.
    fn path_of(&self, handle: ScriptHandle) -> Option<Vec<String>>;
    fn read_source(&self, handle: ScriptHandle) -> Result<String, ScriptHostError>;
    fn write_source(&self, handle: ScriptHandle, source: String) -> Result<(), ScriptHostError>;
}

/// Resolves targets through the [`InstanceCache`] and performs the edits.
///
/// Jobs run concurrently, so every read-modify-write of a source happens
/// under `edits`; a patch never commits over an edit it did not see.
pub struct ScriptService<H> {
    host: Arc<H>,
    cache: InstanceCache<ScriptHandle>,
    edits: Mutex<()>,
}

impl<H: ScriptHost> ScriptService<H> {
    pub fn new(host: Arc<H>, cache_capacity: usize) -> Self {
        Self {
            host,
            cache: InstanceCache::new(cache_capacity),
            edits: Mutex::new(()),
        }
    }

    pub fn cache(&self) -> &InstanceCache<ScriptHandle> {
        &self.cache
    }

    /// Id hits only need to be alive; path hits must also still sit at
    /// that path.
    fn locate(&self, args: &Value) -> Result<ScriptHandle, Value> {
        let target = InstanceRef::from_args(args)?;
        self.cache
            .get_or_resolve(
                &target.cache_key(),
                |handle| {
                    self.host.is_alive(*handle)
                        && match &target {
                            InstanceRef::Id(_) => true,
                            InstanceRef::Path(segments) => {
                                self.host.path_of(*handle).as_deref() == Some(segments.as_slice())
                            }
                        }
                },
                || self.host.resolve(&target),
            )
            .ok_or_else(|| {
                json!({
                    "code": "not_found",
                    "message": format!("no script at {target}"),
                })
            })
    }

    fn read(&self, handle: ScriptHandle) -> Result<String, Value> {
        self.host.read_source(handle).map_err(host_error)
    }

    fn write(&self, handle: ScriptHandle, source: String) -> Result<(), Value> {
        self.host.write_source(handle, source).map_err(host_error)
    }

    pub fn read_script(&self, args: &Value) -> HandlerOutcome {
        let handle = self.locate(args)?;
        let source = self.read(handle)?;
        let line_count = Document::parse(&source).line_count();
        Ok(json!({ "source": source, "lineCount": line_count }))
    }

    pub fn write_script(&self, args: &Value) -> HandlerOutcome {
        let source = args
            .get("source")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid_args("source is required"))?
            .to_string();
        let handle = self.locate(args)?;
        let line_count = Document::parse(&source).line_count();
        let _edit = self.edits.lock();
        self.write(handle, source)?;
        Ok(json!({ "ok": true, "lineCount": line_count }))
    }

    /// Without `startLine`/`endLine` only the line count is returned.
    pub fn get_script_lines(&self, args: &Value) -> HandlerOutcome {
        let handle = self.locate(args)?;
        let document = Document::parse(&self.read(handle)?);
        let line_count = document.line_count();
        let start = args.get("startLine").and_then(Value::as_u64);
        let end = args.get("endLine").and_then(Value::as_u64);
        if start.is_none() && end.is_none() {
            return Ok(json!({ "lineCount": line_count }));
        }
        let start = start.unwrap_or(1) as usize;
        let end = (end.map(|end| end as usize).unwrap_or(line_count)).min(line_count);
        if start == 0 || start > end {
            return Err(json!({
                "code": "invalid_range",
                "message": format!("lines {start}-{end} are outside a {line_count}-line script"),
                "lineCount": line_count,
            }));
        }
        let lines: Vec<Value> = (start..=end)
            .filter_map(|number| {
                document
                    .line(number)
                    .map(|text| json!({ "line": number, "text": text }))
            })
            .collect();
        Ok(json!({
            "startLine": start,
            "endLine": end,
            "lineCount": line_count,
            "lines": lines,
        }))
    }

    /// Reads, patches, and writes back only when the whole batch commits.
    pub fn patch_script(&self, args: &Value) -> HandlerOutcome {
        let request: PatchRequest = serde_json::from_value(args.clone())
            .map_err(|err| invalid_args(&format!("invalid patches: {err}")))?;
        let handle = self.locate(args)?;
        let (line_count, applied) = {
            let _edit = self.edits.lock();
            let source = self.read(handle)?;
            let outcome = script_patch::apply(&source, &request.patches).map_err(|err| {
                debug!(target = "harness.script", error = %err, "patch batch rejected");
                err.to_value()
            })?;
            self.write(handle, outcome.source)?;
            (outcome.line_count, outcome.applied)
        };
        info!(
            target = "harness.script",
            applied,
            line_count,
            "patch batch committed"
        );
        Ok(json!({
            "ok": true,
            "newLineCount": line_count,
            "applied": applied,
        }))
    }
}

fn invalid_args(message: &str) -> Value {
    json!({ "code": "invalid_args", "message": message })
}

fn host_error(err: ScriptHostError) -> Value {
    let code = match err {
        ScriptHostError::Gone => "not_found",
        ScriptHostError::Host(_) => "host_error",
    };
    json!({ "code": code, "message": err.to_string() })
}

#[derive(Clone, Copy)]
enum ScriptJob {
    Read,
    Write,
    Lines,
    Patch,
}

struct ScriptJobHandler<H> {
    service: Arc<ScriptService<H>>,
    job: ScriptJob,
}

#[async_trait]
impl<H: ScriptHost> JobHandler for ScriptJobHandler<H> {
    async fn handle(&self, args: Value) -> HandlerOutcome {
        match self.job {
            ScriptJob::Read => self.service.read_script(&args),
            ScriptJob::Write => self.service.write_script(&args),
            ScriptJob::Lines => self.service.get_script_lines(&args),
            ScriptJob::Patch => self.service.patch_script(&args),
        }
    }
}

/// Registers the four script job types against one shared service.
pub fn register_script_handlers<H: ScriptHost>(
    registry: &mut HandlerRegistry,
    service: Arc<ScriptService<H>>,
) {
    for (job_type, job) in [
        ("read_script", ScriptJob::Read),
        ("write_script", ScriptJob::Write),
        ("get_script_lines", ScriptJob::Lines),
        ("patch_script", ScriptJob::Patch),
    ] {
        registry.register(
            job_type,
            ScriptJobHandler {
                service: service.clone(),
                job,
            },
        );
    }
}

/// In-process [`ScriptHost`] backed by a map of path to source.
#[derive(Default)]
pub struct MemoryScriptHost {
    inner: RwLock<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    sources: HashMap<u64, String>,
    paths: HashMap<String, u64>,
    next_handle: u64,
}

impl MemoryScriptHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates (or recreates) the script at `path`; a recreated script gets
    /// a new handle, so stale references to the old one go dead.
    pub fn insert(&self, path: &str, source: &str) -> ScriptHandle {
        let mut inner = self.inner.write();
        inner.next_handle += 1;
        let handle = inner.next_handle;
        if let Some(old) = inner.paths.insert(path.to_string(), handle) {
            inner.sources.remove(&old);
        }
        inner.sources.insert(handle, source.to_string());
        ScriptHandle(handle)
    }

    /// Moves the script to `to`, keeping its handle.
    pub fn rename(&self, from: &str, to: &str) -> bool {
        let mut inner = self.inner.write();
        let Some(handle) = inner.paths.remove(from) else {
            return false;
        };
        if let Some(displaced) = inner.paths.insert(to.to_string(), handle) {
            inner.sources.remove(&displaced);
        }
        true
    }

    pub fn remove(&self, path: &str) -> bool {
        let mut inner = self.inner.write();
        match inner.paths.remove(path) {
            Some(handle) => inner.sources.remove(&handle).is_some(),
            None => false,
        }
    }

    pub fn source(&self, path: &str) -> Option<String> {
        let inner = self.inner.read();
        let handle = inner.paths.get(path)?;
        inner.sources.get(handle).cloned()
    }
}

impl ScriptHost for MemoryScriptHost {
    fn resolve(&self, target: &InstanceRef) -> Option<ScriptHandle> {
        let inner = self.inner.read();
        let handle = match target {
            InstanceRef::Path(segments) => inner.paths.get(&segments.join(".")).copied(),
            InstanceRef::Id(id) => id
                .parse::<u64>()
                .ok()
                .filter(|handle| inner.sources.contains_key(handle)),
        };
        handle.map(ScriptHandle)
    }

    fn is_alive(&self, handle: ScriptHandle) -> bool {
        self.inner.read().sources.contains_key(&handle.0)
    }

    fn path_of(&self, handle: ScriptHandle) -> Option<Vec<String>> {
        let inner = self.inner.read();
        inner
            .paths
            .iter()
            .find(|(_, candidate)| **candidate == handle.0)
            .map(|(path, _)| path.split('.').map(str::to_string).collect())
    }

    fn read_source(&self, handle: ScriptHandle) -> Result<String, ScriptHostError> {
        self.inner
            .read()
            .sources
            .get(&handle.0)
            .cloned()
            .ok_or(ScriptHostError::Gone)
    }

    fn write_source(&self, handle: ScriptHandle, source: String) -> Result<(), ScriptHostError> {
        let mut inner = self.inner.write();
        let slot = inner.sources.get_mut(&handle.0).ok_or(ScriptHostError::Gone)?;
        *slot = source;
        Ok(())
    }
}

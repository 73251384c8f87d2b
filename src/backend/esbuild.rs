//! Backend driving the `esbuild` executable.
//!
//! Every rebuild runs one esbuild process writing `<stem>.js` and
//! `<stem>.js.map` into a private output directory named after the entry.
//!
//! ```text
//! esbuild <entry> --bundle --outfile=<outdir>/<stem>.js --sourcemap=external ...
//!    └─ stdin mode: source piped in, --sourcefile=<name>, cwd = resolve_dir
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{Backend, BackendFactory, BuildFailure, BuildInput, BuildOptions, OutputFile};
use crate::utils::hash;
use crate::{debug, log};

/// Creates one [`EsbuildContext`] per entry.
#[derive(Debug, Clone)]
pub struct EsbuildFactory {
    binary: PathBuf,
    /// Working directory for path entries, also where `node_modules` lives
    root: PathBuf,
    /// Parent of the per-entry output directories
    out_root: PathBuf,
}

impl EsbuildFactory {
    /// Find `esbuild` on `PATH`, falling back to `<root>/node_modules/.bin`.
    pub fn locate(root: &Path) -> Result<Self, BuildFailure> {
        let local = root.join("node_modules").join(".bin").join(executable_name());
        let binary = which::which("esbuild")
            .ok()
            .or_else(|| local.is_file().then(|| local.clone()))
            .ok_or_else(|| {
                BuildFailure::MissingExecutable(format!(
                    "esbuild executable not found on PATH or at {}",
                    local.display()
                ))
            })?;

        debug!("bundle"; "using esbuild at {}", binary.display());
        Ok(Self::with_binary(binary, root))
    }

    pub fn with_binary(binary: impl Into<PathBuf>, root: &Path) -> Self {
        Self {
            binary: binary.into(),
            root: root.to_path_buf(),
            out_root: std::env::temp_dir().join("rebundle"),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl BackendFactory for EsbuildFactory {
    type Backend = EsbuildContext;

    async fn context(&self, options: &BuildOptions) -> Result<EsbuildContext, BuildFailure> {
        let entry = options
            .entry
            .clone()
            .ok_or_else(|| BuildFailure::Message("no entry point configured".into()))?;

        let identity = match &entry {
            BuildInput::Path(path) => path.as_os_str().to_string_lossy().into_owned(),
            BuildInput::Source {
                resolve_dir,
                sourcefile,
                ..
            } => resolve_dir.join(sourcefile).to_string_lossy().into_owned(),
        };
        let outdir = options
            .outdir
            .clone()
            .unwrap_or_else(|| self.out_root.join(hash::fingerprint(&identity)));

        tokio::fs::create_dir_all(&outdir)
            .await
            .map_err(|e| BuildFailure::io(format!("cannot create {}", outdir.display()), e))?;

        if !options.plugins.is_empty() {
            log!("bundle"; "the esbuild executable cannot load plugins, ignoring: {}",
                options.plugins.join(", "));
        }

        let code_path = outdir.join(format!("{}.js", output_stem(&entry)));
        let mut map_path = code_path.clone().into_os_string();
        map_path.push(".map");
        let map_path = PathBuf::from(map_path);

        let (cwd, stdin) = match &entry {
            BuildInput::Path(_) => (self.root.clone(), None),
            BuildInput::Source {
                contents,
                resolve_dir,
                ..
            } => (resolve_dir.clone(), Some(contents.clone())),
        };

        Ok(EsbuildContext {
            binary: self.binary.clone(),
            args: build_args(options, &entry, &code_path),
            cwd,
            stdin,
            outdir,
            code_path,
            map_path,
            disposed: false,
        })
    }
}

/// One entry's esbuild invocation.
#[derive(Debug)]
pub struct EsbuildContext {
    binary: PathBuf,
    args: Vec<OsString>,
    cwd: PathBuf,
    stdin: Option<String>,
    outdir: PathBuf,
    code_path: PathBuf,
    map_path: PathBuf,
    disposed: bool,
}

impl Backend for EsbuildContext {
    async fn rebuild(&mut self) -> Result<Vec<OutputFile>, BuildFailure> {
        if self.disposed {
            return Err(BuildFailure::Message("build context disposed".into()));
        }

        let mut command = Command::new(&self.binary);
        command
            .args(&self.args)
            .current_dir(&self.cwd)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let name = self.binary.display().to_string();
        let mut child = command
            .spawn()
            .map_err(|e| BuildFailure::io(format!("failed to spawn `{name}`"), e))?;

        if let (Some(source), Some(mut stdin)) = (&self.stdin, child.stdin.take()) {
            stdin
                .write_all(source.as_bytes())
                .await
                .map_err(|e| BuildFailure::io(format!("failed to write stdin to `{name}`"), e))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| BuildFailure::io(format!("failed to wait for `{name}`"), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = stderr.trim();
            return Err(BuildFailure::Message(if message.is_empty() {
                format!("`{name}` exited with {}", output.status)
            } else {
                message.to_owned()
            }));
        }

        // Missing files are left out; the coordinator reports them
        let mut files = Vec::with_capacity(2);
        for path in [&self.map_path, &self.code_path] {
            match tokio::fs::read(path).await {
                Ok(contents) => files.push(OutputFile::new(path.clone(), contents)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(BuildFailure::io(format!("cannot read {}", path.display()), e));
                }
            }
        }
        Ok(files)
    }

    async fn dispose(&mut self) {
        if std::mem::replace(&mut self.disposed, true) {
            return;
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.outdir).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            debug!("bundle"; "failed to remove {}: {}", self.outdir.display(), e);
        }
    }
}

fn executable_name() -> &'static str {
    if cfg!(windows) { "esbuild.cmd" } else { "esbuild" }
}

/// File stem of the emitted code: the entry's own stem.
fn output_stem(entry: &BuildInput) -> String {
    let path = match entry {
        BuildInput::Path(path) => path.as_path(),
        BuildInput::Source { sourcefile, .. } => Path::new(sourcefile),
    };
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stdin".into())
}

/// Command line for one entry.
fn build_args(options: &BuildOptions, entry: &BuildInput, code_path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();

    match entry {
        BuildInput::Path(path) => args.push(path.into()),
        BuildInput::Source { sourcefile, .. } => {
            args.push(format!("--sourcefile={sourcefile}").into());
        }
    }

    if options.bundle {
        args.push("--bundle".into());
    }

    let mut outfile = OsString::from("--outfile=");
    outfile.push(code_path);
    args.push(outfile);

    args.push(format!("--sourcemap={}", options.sourcemap.as_str()).into());
    args.push(format!("--target={}", options.target).into());
    args.push(format!("--platform={}", options.platform.as_str()).into());
    args.push(format!("--format={}", options.format.as_str()).into());
    args.push("--color=false".into());
    args.push("--log-level=warning".into());

    for (key, value) in options.effective_define() {
        args.push(format!("--define:{key}={value}").into());
    }

    for (key, value) in &options.extra {
        args.extend(extra_flag(key, value).into_iter().map(OsString::from));
    }

    args
}

/// Translate a pass-through option into esbuild flags.
///
/// `jsx_factory = "h"` → `--jsx-factory=h`, `minify = true` → `--minify`,
/// `main_fields = ["module", "main"]` → `--main-fields=module,main`,
/// `loader = { ".png" = "file" }` → `--loader:.png=file`.
fn extra_flag(key: &str, value: &Value) -> Vec<String> {
    let flag = kebab_case(key);
    match value {
        Value::Null | Value::Bool(false) => Vec::new(),
        Value::Bool(true) => vec![format!("--{flag}")],
        Value::String(s) => vec![format!("--{flag}={s}")],
        Value::Number(n) => vec![format!("--{flag}={n}")],
        Value::Array(items) => {
            let joined = items.iter().map(scalar).collect::<Vec<_>>().join(",");
            vec![format!("--{flag}={joined}")]
        }
        Value::Object(entries) => entries
            .iter()
            .map(|(sub, v)| format!("--{flag}:{sub}={}", scalar(v)))
            .collect(),
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `jsx_factory` and `jsxFactory` both become `jsx-factory`.
fn kebab_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        match ch {
            '_' => out.push('-'),
            c if c.is_ascii_uppercase() => {
                if !out.is_empty() {
                    out.push('-');
                }
                out.push(c.to_ascii_lowercase());
            }
            c => out.push(c),
        }
    }
    out
}

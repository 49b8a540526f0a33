//! `pack` build executor implementation.

use async_trait::async_trait;
use bpvenom_core::build::{BuildOptions, BuildResult};
use bpvenom_core::context::{CancelSignal, ExecutionContext};
use bpvenom_core::executor::Executor;
use bpvenom_core::step::{Assertion, PACK_EXECUTOR, StepAction, StepAssertions, StepOutput};
use bpvenom_core::{Error, Result, ResultExt};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::{debug, error, info};

/// Executor that builds images by shelling out to `pack`.
#[derive(Debug, Default)]
pub struct PackExecutor;

impl PackExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Registry constructor.
    pub fn boxed() -> Box<dyn Executor> {
        Box::new(Self::new())
    }

    /// Run `pack build` and, when it succeeds, `pack inspect` on the result.
    ///
    /// A non-zero build exit is reported through [`BuildResult::code`]. Errors
    /// are reserved for failures to resolve, start or wait on `pack`, and for
    /// an inspect phase that fails after a successful build.
    pub async fn build(&self, ctx: &ExecutionContext, opts: &BuildOptions) -> Result<BuildResult> {
        let command = PackCommand::build(ctx, opts).context("unable to execute pack")?;

        info!(command = %command, "Running pack command");
        let output = command
            .run(ctx.cancel())
            .await
            .context("unable to execute pack")?;

        let mut result = BuildResult {
            code: exit_code(output.status),
            command: command.to_string(),
            systemout: output.stdout,
            systemerr: output.stderr,
            image_info: Map::new(),
        };

        if result.is_success() {
            result.image_info = inspect_image(opts, ctx.cancel())
                .await
                .context("unable to inspect image")?;
        } else {
            error!(code = result.code, image = %opts.image_name, "pack build failed");
        }

        Ok(result)
    }
}

#[async_trait]
impl Executor for PackExecutor {
    fn name(&self) -> &'static str {
        PACK_EXECUTOR
    }

    async fn run(&self, ctx: &ExecutionContext, action: &StepAction) -> Result<StepOutput> {
        match action {
            StepAction::Pack(opts) => Ok(StepOutput::Pack(self.build(ctx, opts).await?)),
            other => Err(Error::InvalidInput(format!(
                "pack executor cannot run a {} step",
                other.executor()
            ))),
        }
    }

    fn default_assertions(&self) -> Option<StepAssertions> {
        Some(default_assertions())
    }
}

/// Checks applied to a pack step that declares none.
pub fn default_assertions() -> StepAssertions {
    StepAssertions::new([
        Assertion::from("result.code ShouldEqual 0"),
        Assertion::from("result.systemerr ShouldEqual ''"),
    ])
}

/// Arguments of `pack build`, in the order pack expects them.
pub fn build_args(opts: &BuildOptions) -> Vec<String> {
    let mut args = vec!["build".to_string(), opts.image_name.clone()];

    if let Some(builder) = non_empty(&opts.builder) {
        args.extend(["--builder".to_string(), builder.to_string()]);
    }
    for bp in &opts.buildpacks {
        args.extend(["-b".to_string(), bp.clone()]);
    }
    if opts.clear_cache {
        args.push("--clear-cache".to_string());
    }
    for (name, value) in &opts.env {
        args.extend(["-e".to_string(), format!("{}={}", name, value)]);
    }
    args.extend(opts.extra_args.iter().cloned());
    if let Some(gid) = opts.gid {
        args.extend(["--gid".to_string(), gid.to_string()]);
    }
    if let Some(network) = non_empty(&opts.network) {
        args.extend(["--network".to_string(), network.to_string()]);
    }
    if opts.no_color {
        args.push("--no-color".to_string());
    }
    if opts.no_pull {
        args.push("--no-pull".to_string());
    }
    if let Some(path) = non_empty(&opts.path) {
        args.extend(["-p".to_string(), path.to_string()]);
    }
    if let Some(policy) = non_empty(&opts.pull_policy) {
        args.extend(["--pull-policy".to_string(), policy.to_string()]);
    }
    if let Some(dir) = non_empty(&opts.sbom_output_dir) {
        args.extend(["--sbom-output-dir".to_string(), dir.to_string()]);
    }
    if opts.trust_builder {
        args.push("--trust-builder".to_string());
    }
    if opts.verbose {
        args.push("--verbose".to_string());
    }
    for vol in &opts.volumes {
        args.extend(["--volume".to_string(), vol.clone()]);
    }

    args
}

/// Arguments of `pack inspect` producing a JSON report.
pub fn inspect_args(image_name: &str) -> Vec<String> {
    ["inspect", image_name, "--output", "json", "-q"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// A resolved pack invocation.
#[derive(Debug, Clone)]
pub struct PackCommand {
    program: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl PackCommand {
    /// Resolve the binary and validate the options for `pack build`.
    pub fn build(ctx: &ExecutionContext, opts: &BuildOptions) -> Result<Self> {
        let program = resolve_binary(opts.pack_binary())?;
        opts.validate()?;
        Ok(Self {
            program,
            args: build_args(opts),
            working_dir: ctx.working_dir().map(Path::to_path_buf),
        })
    }

    /// Resolve the binary and validate the options for `pack inspect`.
    pub fn inspect(opts: &BuildOptions) -> Result<Self> {
        let program = resolve_binary(opts.pack_binary())?;
        opts.validate()?;
        Ok(Self {
            program,
            args: inspect_args(&opts.image_name),
            working_dir: None,
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Run to completion with both output streams captured.
    ///
    /// The child is killed if `cancel` fires first.
    async fn run(&self, cancel: &CancelSignal) -> Result<CapturedOutput> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let output = tokio::select! {
            output = cmd.output() => output.map_err(|e| {
                Error::ExecutionFailed(format!("{}: {}", self.program.display(), e))
            })?,
            _ = cancel.cancelled() => {
                debug!(command = %self, "Cancelled, killing pack");
                return Err(Error::Cancelled);
            }
        };

        Ok(CapturedOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

impl fmt::Display for PackCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

struct CapturedOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

/// -1 when the process was terminated by a signal.
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[derive(Deserialize)]
struct InspectReport {
    local_info: Map<String, Value>,
}

async fn inspect_image(opts: &BuildOptions, cancel: &CancelSignal) -> Result<Map<String, Value>> {
    let command = PackCommand::inspect(opts)?;
    debug!(command = %command, "Inspecting image");

    let output = command.run(cancel).await?;
    if !output.status.success() {
        return Err(Error::ExecutionFailed(format!(
            "{} exited with code {}: {}",
            command,
            exit_code(output.status),
            output.stderr.trim()
        )));
    }

    let report: InspectReport =
        serde_json::from_str(&output.stdout).map_err(|e| Error::Inspect(e.to_string()))?;
    Ok(report.local_info)
}

/// Locate the builder binary through `PATH` after lexically cleaning it.
fn resolve_binary(binary: &str) -> Result<PathBuf> {
    let cleaned = clean_path(binary);
    which::which(&cleaned).map_err(|e| Error::BinaryNotFound {
        binary: cleaned.display().to_string(),
        reason: e.to_string(),
    })
}

/// Collapse `.` and `..` components without touching the filesystem.
/// A leading `./` is kept so explicitly relative paths are not searched in `PATH`.
fn clean_path(binary: &str) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for comp in Path::new(binary).components() {
        match comp {
            Component::CurDir if out.is_empty() => out.push(comp),
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(comp),
            },
            other => out.push(other),
        }
    }

    if out.is_empty() {
        PathBuf::from(".")
    } else {
        out.iter().collect()
    }
}


/// Tests running shell-script stand-ins for the pack binary.
#[cfg(all(test, unix))]
mod stand_in_tests {
    use super::*;
    use bpvenom_core::cancel_pair;
    use serial_test::serial;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Write an executable `pack` script dispatching on its first argument.
    fn write_pack(dir: &TempDir, build: &str, inspect: &str) -> PathBuf {
        let script = format!(
            "#!/bin/sh\ncase \"$1\" in\n  build)\n{}\n    ;;\n  inspect)\n{}\n    ;;\nesac\n",
            build, inspect
        );
        write_script(dir, &script)
    }

    fn write_script(dir: &TempDir, script: &str) -> PathBuf {
        let path = dir.path().join("pack");
        std::fs::write(&path, script).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn options(pack: &Path) -> BuildOptions {
        BuildOptions {
            pack_binary: Some(pack.display().to_string()),
            ..BuildOptions::new("local/app")
        }
    }

    #[tokio::test]
    #[serial]
    async fn test_empty_image_name_never_invokes_pack() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("invoked");
        let touch = format!("    touch '{}'", marker.display());
        let pack = write_pack(&dir, &touch, &touch);

        let opts = BuildOptions {
            image_name: String::new(),
            ..options(&pack)
        };
        let err = PackExecutor::new()
            .build(&ExecutionContext::new(), &opts)
            .await
            .unwrap_err();

        assert!(matches!(err.root(), Error::InvalidInput(_)));
        assert!(err.to_string().contains("image-name must be defined"));
        assert!(!marker.exists(), "pack should not have been invoked");
    }

    #[tokio::test]
    #[serial]
    async fn test_failed_build_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("inspected");
        let pack = write_pack(
            &dir,
            "    printf boom >&2\n    exit 7",
            &format!("    touch '{}'", marker.display()),
        );

        let result = PackExecutor::new()
            .build(&ExecutionContext::new(), &options(&pack))
            .await
            .unwrap();

        assert_eq!(result.code, 7);
        assert_eq!(result.systemerr, "boom");
        assert!(result.image_info.is_empty());
        assert!(!marker.exists(), "inspect should not run after a failed build");
    }

    #[tokio::test]
    #[serial]
    async fn test_successful_build_collects_image_info() {
        let dir = tempfile::tempdir().unwrap();
        let pack = write_pack(
            &dir,
            "    echo \"building $2\"",
            "    echo '{\"local_info\":{\"id\":\"sha256:abc\"},\"remote_info\":null}'",
        );

        let result = PackExecutor::new()
            .build(&ExecutionContext::new(), &options(&pack))
            .await
            .unwrap();

        assert_eq!(result.code, 0);
        assert_eq!(result.systemout, "building local/app\n");
        assert_eq!(result.systemerr, "");
        assert!(result.command.ends_with("/pack build local/app"));
        assert_eq!(result.image_info.len(), 1);
        assert_eq!(result.image_info["id"], "sha256:abc");
    }

    #[tokio::test]
    #[serial]
    async fn test_malformed_inspect_output_discards_build() {
        let dir = tempfile::tempdir().unwrap();
        let pack = write_pack(&dir, "    exit 0", "    echo 'not json'");

        let err = PackExecutor::new()
            .build(&ExecutionContext::new(), &options(&pack))
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("unable to inspect image: "));
        assert!(matches!(err.root(), Error::Inspect(_)));
    }

    #[tokio::test]
    #[serial]
    async fn test_inspect_without_local_info_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pack = write_pack(&dir, "    exit 0", "    echo '{\"remote_info\":{}}'");

        let err = PackExecutor::new()
            .build(&ExecutionContext::new(), &options(&pack))
            .await
            .unwrap_err();

        assert!(matches!(err.root(), Error::Inspect(_)));
    }

    #[tokio::test]
    #[serial]
    async fn test_failed_inspect_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pack = write_pack(&dir, "    exit 0", "    echo 'no such image' >&2\n    exit 1");

        let err = PackExecutor::new()
            .build(&ExecutionContext::new(), &options(&pack))
            .await
            .unwrap_err();

        assert!(matches!(err.root(), Error::ExecutionFailed(_)));
        assert!(err.to_string().contains("no such image"));
    }

    #[tokio::test]
    #[serial]
    async fn test_inspect_with_null_local_info_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pack = write_pack(&dir, "    exit 0", "    echo '{\"local_info\":null}'");

        let err = PackExecutor::new()
            .build(&ExecutionContext::new(), &options(&pack))
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("unable to inspect image: "));
        assert!(matches!(err.root(), Error::Inspect(_)));
    }

    #[tokio::test]
    #[serial]
    async fn test_unstartable_pack_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pack = write_script(&dir, "#!/nonexistent/interp\nexit 0\n");

        let err = PackExecutor::new()
            .build(&ExecutionContext::new(), &options(&pack))
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("unable to execute pack: "));
        assert!(matches!(err.root(), Error::ExecutionFailed(_)));
    }

    #[tokio::test]
    #[serial]
    async fn test_inspect_resolves_pack_again() {
        let dir = tempfile::tempdir().unwrap();
        let pack = write_pack(&dir, "    rm \"$0\"\n    exit 0", "    echo '{\"local_info\":{}}'");

        let err = PackExecutor::new()
            .build(&ExecutionContext::new(), &options(&pack))
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("unable to inspect image: "));
        assert!(matches!(err.root(), Error::BinaryNotFound { .. }));
    }

    #[tokio::test]
    #[serial]
    async fn test_build_runs_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = tempfile::tempdir().unwrap();
        let pack = write_pack(&dir, "    pwd", "    echo '{\"local_info\":{}}'");

        let ctx = ExecutionContext::new().with_working_dir(workdir.path());
        let result = PackExecutor::new().build(&ctx, &options(&pack)).await.unwrap();

        assert_eq!(
            Path::new(result.systemout.trim()).canonicalize().unwrap(),
            workdir.path().canonicalize().unwrap()
        );
        assert!(result.image_info.is_empty());
    }

    #[tokio::test]
    #[serial]
    async fn test_cancel_kills_running_build() {
        let dir = tempfile::tempdir().unwrap();
        let pack = write_pack(&dir, "    sleep 30", "    exit 0");

        let (handle, signal) = cancel_pair();
        let ctx = ExecutionContext::new().with_cancel(signal);
        let opts = options(&pack);

        let executor = PackExecutor::new();
        let build = executor.build(&ctx, &opts);
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.cancel();
        };

        let (res, ()) = tokio::time::timeout(Duration::from_secs(10), async {
            tokio::join!(build, cancel)
        })
        .await
        .expect("cancelled build should return promptly");

        let err = res.unwrap_err();
        assert!(matches!(err.root(), Error::Cancelled));
    }

    #[tokio::test]
    #[serial]
    async fn test_run_returns_pack_output() {
        let dir = tempfile::tempdir().unwrap();
        let pack = write_pack(&dir, "    exit 3", "    exit 0");

        let output = PackExecutor::new()
            .run(&ExecutionContext::new(), &StepAction::Pack(options(&pack)))
            .await
            .unwrap();

        match output {
            StepOutput::Pack(result) => assert_eq!(result.code, 3),
            other => panic!("Expected pack output, got {:?}", other),
        }
    }
}

use serde::Deserialize;
use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
};

/// Raw shape of a `kernels.json` file.
#[derive(Debug, Deserialize)]
pub struct KernelsJsonConfig {
    pub kernels: BTreeMap<String, KernelSpecConfig>,
}

/// One kernel entry as written in `kernels.json`.
#[derive(Debug, Deserialize, Clone)]
pub struct KernelSpecConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// A fully resolved kernel launch spec: the command line and environment
/// used to spawn the kernel process for a named kernel.
#[derive(Debug, Clone)]
pub struct KernelSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// The stdin/stdout exec harness behind the built-in `python3` kernel.
///
/// Reads one JSON request per line, runs the code in a namespace shared
/// across cells, and reports captured streams, exceptions, and a final
/// reply over the wire protocol.
const PYTHON3_HARNESS: &str = r#"
import io, json, sys, traceback
from contextlib import redirect_stdout, redirect_stderr

ns = {"__name__": "__main__"}

def emit(msg):
    sys.__stdout__.write(json.dumps(msg) + "\n")
    sys.__stdout__.flush()

for line in sys.stdin:
    line = line.strip()
    if not line:
        continue
    req = json.loads(line)
    if req.get("op") == "shutdown":
        break
    mid = req.get("id")
    out, err = io.StringIO(), io.StringIO()
    failure = None
    try:
        with redirect_stdout(out), redirect_stderr(err):
            exec(compile(req.get("code", ""), "<cell>", "exec"), ns)
    except BaseException:
        failure = sys.exc_info()
    if out.getvalue():
        emit({"msg_type": "stream", "id": mid, "name": "stdout", "text": out.getvalue()})
    if err.getvalue():
        emit({"msg_type": "stream", "id": mid, "name": "stderr", "text": err.getvalue()})
    if failure is None:
        emit({"msg_type": "reply", "id": mid, "status": "ok"})
    else:
        etype, evalue, tb = failure
        emit({"msg_type": "error", "id": mid, "ename": etype.__name__,
              "evalue": str(evalue),
              "traceback": traceback.format_exception(etype, evalue, tb)})
        emit({"msg_type": "reply", "id": mid, "status": "error"})
"#;

/// Locate the kernels.json registry file, if any.
///
/// Order: explicit path, `NBRUN_KERNELS`, `$XDG_CONFIG_HOME/nbrun/kernels.json`,
/// `./kernels.json`. A missing registry is not an error; the built-in
/// defaults still apply.
pub fn resolve_registry_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }

    if let Ok(p) = env::var("NBRUN_KERNELS") {
        return Some(PathBuf::from(p));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("nbrun").join("kernels.json");
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let candidate = PathBuf::from("kernels.json");
    if candidate.exists() {
        return Some(candidate);
    }

    None
}

fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            if let Ok(val) = env::var(&name) {
                out.push_str(&val);
            } else {
                out.push_str("${");
                out.push_str(&name);
                out.push('}');
            }
        } else {
            out.push(ch);
        }
    }

    out
}

fn expand_spec(cfg: KernelSpecConfig) -> KernelSpecConfig {
    let mut cfg = cfg;

    cfg.command = expand_env_vars(&cfg.command);
    cfg.args = cfg.args.iter().map(|a| expand_env_vars(a)).collect();
    for val in cfg.env.values_mut() {
        *val = expand_env_vars(val);
    }

    cfg
}

fn builtin_spec(name: &str) -> Option<KernelSpec> {
    (name == "python3").then(|| KernelSpec {
        name: name.to_string(),
        command: "python3".to_string(),
        args: vec!["-c".to_string(), PYTHON3_HARNESS.to_string()],
        env: BTreeMap::new(),
    })
}

/// Resolve a kernel name to a launch spec.
///
/// An entry in the registry file wins over the built-in `python3` default;
/// a name found in neither is an error.
pub fn resolve_kernel(name: &str, registry_file: Option<&Path>) -> anyhow::Result<KernelSpec> {
    if let Some(path) = resolve_registry_path(registry_file) {
        let raw = fs::read_to_string(&path)?;
        let cfg: KernelsJsonConfig = serde_json::from_str(&raw)?;

        if let Some(spec_cfg) = cfg.kernels.get(name) {
            let expanded = expand_spec(spec_cfg.clone());
            return Ok(KernelSpec {
                name: name.to_string(),
                command: expanded.command,
                args: expanded.args,
                env: expanded.env,
            });
        }
    }

    builtin_spec(name).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown kernel `{}` (not in kernels.json and no built-in default)",
            name
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_resolve_from_registry_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernels.json");
        let mut f = fs::File::create(&path).unwrap();
        write!(
            f,
            r#"{{"kernels": {{"deno": {{"command": "deno", "args": ["run", "kernel.ts"]}}}}}}"#
        )
        .unwrap();

        let spec = resolve_kernel("deno", Some(&path)).unwrap();
        assert_eq!(spec.command, "deno");
        assert_eq!(spec.args, vec!["run", "kernel.ts"]);
        assert!(spec.env.is_empty());
    }

    #[test]
    fn test_registry_entry_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernels.json");
        fs::write(
            &path,
            r#"{"kernels": {"python3": {"command": "/opt/py/bin/python3", "args": ["-c", "loop()"]}}}"#,
        )
        .unwrap();

        let spec = resolve_kernel("python3", Some(&path)).unwrap();
        assert_eq!(spec.command, "/opt/py/bin/python3");
    }

    #[test]
    fn test_builtin_python3_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernels.json");
        fs::write(&path, r#"{"kernels": {}}"#).unwrap();

        let spec = resolve_kernel("python3", Some(&path)).unwrap();
        assert_eq!(spec.command, "python3");
        assert_eq!(spec.args[0], "-c");
        assert!(spec.args[1].contains("msg_type"));
    }

    #[test]
    fn test_unknown_kernel_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernels.json");
        fs::write(&path, r#"{"kernels": {}}"#).unwrap();

        let err = resolve_kernel("julia", Some(&path)).unwrap_err();
        assert!(err.to_string().contains("julia"));
    }

    #[test]
    fn test_expand_env_vars() {
        // PATH is always present in a test environment.
        let path_val = env::var("PATH").unwrap();
        assert_eq!(expand_env_vars("pre-${PATH}-post"), format!("pre-{path_val}-post"));

        // Unknown names are left as written.
        assert_eq!(
            expand_env_vars("${NBRUN_TEST_DOES_NOT_EXIST}"),
            "${NBRUN_TEST_DOES_NOT_EXIST}"
        );
        assert_eq!(expand_env_vars("no vars here"), "no vars here");
    }
}

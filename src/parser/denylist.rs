//! Standard-library and framework module denylist.
//!
//! Imports of these modules say nothing about the project's own code, so the
//! parser drops them. One shared list covers Python, Node and the common
//! frontend/backend frameworks; projects adjust it through config.

use std::collections::HashSet;

use super::SupportedLanguage;

/// Root module names treated as external by default.
pub const DEFAULT_DENYLIST: &[&str] = &[
    // Python standard library
    "abc", "argparse", "asyncio", "base64", "collections", "concurrent", "contextlib",
    "copy", "csv", "dataclasses", "datetime", "decimal", "enum", "functools", "glob",
    "hashlib", "heapq", "http", "importlib", "inspect", "io", "itertools", "json",
    "logging", "math", "multiprocessing", "operator", "os", "pathlib", "pickle",
    "random", "re", "shutil", "signal", "socket", "sqlite3", "string", "struct",
    "subprocess", "sys", "tempfile", "threading", "time", "traceback", "types",
    "typing", "typing_extensions", "unittest", "urllib", "uuid", "warnings", "weakref",
    "__future__",
    // Python frameworks and data stack
    "django", "flask", "fastapi", "pydantic", "requests", "numpy", "pandas", "scipy",
    "sklearn", "torch", "tensorflow", "matplotlib", "seaborn", "pytest",
    // Node core
    "assert", "buffer", "child_process", "cluster", "crypto", "dns", "events", "fs",
    "https", "net", "os", "path", "process", "querystring", "readline", "stream",
    "timers", "tls", "tty", "url", "util", "v8", "vm", "worker_threads", "zlib",
    // JS frameworks and tooling
    "react", "react-dom", "vue", "svelte", "next", "express", "koa", "lodash",
    "axios", "rxjs", "jest", "vitest", "mocha", "chai", "@angular/core",
    "@angular/common", "@testing-library/react",
];

/// Builtin calls and accessors dropped as noise by the default inclusion policy.
pub const DEFAULT_NOISE_SYMBOLS: &[&str] = &[
    "print", "len", "str", "int", "isinstance", "super", "range", "require", "log",
    "console", "toString",
];

#[derive(Debug, Clone)]
pub struct ModuleDenylist {
    modules: HashSet<String>,
}

impl ModuleDenylist {
    pub fn empty() -> Self {
        Self {
            modules: HashSet::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self {
            modules: DEFAULT_DENYLIST.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn extend(mut self, modules: impl IntoIterator<Item = String>) -> Self {
        self.modules.extend(modules);
        self
    }

    pub fn allow<'a>(mut self, modules: impl IntoIterator<Item = &'a str>) -> Self {
        for module in modules {
            self.modules.remove(module);
        }
        self
    }

    /// Whether an import of `module` from a file in `language` is external.
    /// Relative imports are never denied.
    pub fn is_denied(&self, module: &str, language: SupportedLanguage) -> bool {
        match root_module(module, language) {
            Some(root) => self.modules.contains(root),
            None => false,
        }
    }
}

impl Default for ModuleDenylist {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// The package-level name of an import specifier, or `None` for relative imports.
///
/// `os.path` -> `os`, `node:fs` -> `fs`, `lodash/fp` -> `lodash`,
/// `@angular/core/testing` -> `@angular/core`.
pub fn root_module(module: &str, language: SupportedLanguage) -> Option<&str> {
    let module = module.trim();
    if module.is_empty() || module.starts_with('.') || module.starts_with('/') {
        return None;
    }
    if !language.is_ecmascript() {
        return module.split('.').next();
    }
    let module = module.strip_prefix("node:").unwrap_or(module);
    if module.starts_with('@') {
        let mut parts = module.splitn(3, '/');
        let scope = parts.next()?;
        let name = parts.next()?;
        return Some(&module[..scope.len() + 1 + name.len()]);
    }
    module.split('/').next()
}

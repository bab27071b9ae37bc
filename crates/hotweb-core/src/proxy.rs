//! Module proxy generation.
//!
//! A proxy stands in for a real module. It imports the module once under a
//! fixed query, re-exports a mutable binding per export, and on each change
//! notification either re-imports the module under the notification timestamp
//! and rebinds every export, or reloads the page when the module opted out.

use std::fmt::Write;

/// Inputs for one rendered proxy.
#[derive(Debug, Clone, Copy)]
pub struct ModuleProxy<'a> {
    /// Request path of the real module, including any mount prefix, as the
    /// browser sent it.
    pub path: &'a str,
    /// Key registered with the bootstrap's `accept`. Change notifications
    /// carry decoded paths, so this differs from `path` when the request was
    /// percent-encoded.
    pub accept_path: &'a str,
    /// Export names, in the order they appear in the generated code.
    pub exports: &'a [String],
    /// Reload the page instead of swapping exports.
    pub reload: bool,
    /// URL path of the bootstrap script.
    pub client_path: &'a str,
}

impl<'a> ModuleProxy<'a> {
    /// Build a proxy description. `reload` is set when `exports` contains `reload_export`.
    #[must_use]
    pub fn new(path: &'a str, exports: &'a [String], client_path: &'a str, reload_export: &str) -> Self {
        Self {
            path,
            accept_path: path,
            exports,
            reload: exports.iter().any(|name| name == reload_export),
            client_path,
        }
    }

    /// Register the proxy under `key` instead of the request path.
    #[must_use]
    pub fn accept_as(mut self, key: &'a str) -> Self {
        self.accept_path = key;
        self
    }

    /// Render the proxy module source.
    #[must_use]
    pub fn render(&self) -> String {
        let path = escape_js(self.path);
        let key = escape_js(self.accept_path);
        let client = escape_js(self.client_path);
        let mut out = String::with_capacity(256 + self.exports.len() * 64);

        let _ = writeln!(out, "import * as hotweb from '{client}';");
        let _ = writeln!(out, "import * as mod from '{path}?0';");
        out.push('\n');

        for name in self.exports {
            let _ = writeln!(out, "let {name}Proxy = mod.{name};");
        }
        if !self.exports.is_empty() {
            out.push('\n');
        }

        let _ = writeln!(out, "hotweb.accept('{key}', async (ts) => {{");
        if self.reload {
            out.push_str("\tlocation.reload();\n");
        } else {
            let _ = writeln!(out, "\tlet newMod = await import(\"{path}?\" + ts);");
            for name in self.exports {
                let _ = writeln!(out, "\t{name}Proxy = newMod.{name};");
            }
        }
        out.push_str("});\n\n");

        out.push_str("export {\n");
        for name in self.exports {
            let _ = writeln!(out, "\t{name}Proxy as {name},");
        }
        out.push_str("};\n");

        out
    }
}

/// Escape text for use inside a single- or double-quoted JS string literal.
pub(crate) fn escape_js(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_accept_key_differs_from_url() {
        let exports = names(&["spaced"]);
        let src = ModuleProxy::new("/my%20page.js", &exports, "/.hotweb/client.mjs", "noHMR")
            .accept_as("/my page.js")
            .render();
        assert!(src.contains("import * as mod from '/my%20page.js?0';\n"));
        assert!(src.contains("hotweb.accept('/my page.js', async (ts) => {\n"));
        assert!(src.contains("await import(\"/my%20page.js?\" + ts);"));
    }

    #[test]
    fn test_hot_swap_proxy() {
        let exports = names(&["render", "count"]);
        let proxy = ModuleProxy::new("/app.js", &exports, "/.hotweb/client.mjs", "noHMR");
        assert!(!proxy.reload);

        let src = proxy.render();
        assert!(src.starts_with("import * as hotweb from '/.hotweb/client.mjs';\n"));
        assert!(src.contains("import * as mod from '/app.js?0';\n"));
        assert!(src.contains("let renderProxy = mod.render;\n"));
        assert!(src.contains("let countProxy = mod.count;\n"));
        assert!(src.contains("hotweb.accept('/app.js', async (ts) => {\n"));
        assert!(src.contains("\tlet newMod = await import(\"/app.js?\" + ts);\n"));
        assert!(src.contains("\trenderProxy = newMod.render;\n"));
        assert!(src.contains("\tcountProxy = newMod.count;\n"));
        assert!(src.contains("\trenderProxy as render,\n"));
        assert!(src.contains("\tcountProxy as count,\n"));
        assert!(!src.contains("location.reload"));
    }

    #[test]
    fn test_reload_sentinel_forces_reload() {
        let exports = names(&["render", "noHMR"]);
        let proxy = ModuleProxy::new("/app.js", &exports, "/.hotweb/client.mjs", "noHMR");
        assert!(proxy.reload);

        let src = proxy.render();
        assert!(src.contains("hotweb.accept('/app.js', async (ts) => {\n\tlocation.reload();\n});"));
        assert!(!src.contains("newMod"));
        // Bindings are still exported so importers keep working until the reload
        assert!(src.contains("\trenderProxy as render,\n"));
        assert!(src.contains("\tnoHMRProxy as noHMR,\n"));
    }

    #[test]
    fn test_custom_sentinel() {
        let exports = names(&["coldOnly"]);
        let proxy = ModuleProxy::new("/cold.js", &exports, "/.hotweb/client.mjs", "coldOnly");
        assert!(proxy.reload);
    }

    #[test]
    fn test_no_exports() {
        let proxy = ModuleProxy::new("/side-effect.js", &[], "/.hotweb/client.mjs", "noHMR");
        let src = proxy.render();
        assert!(src.contains("import * as mod from '/side-effect.js?0';"));
        assert!(src.contains("await import(\"/side-effect.js?\" + ts);"));
        assert!(src.ends_with("export {\n};\n"));
    }

    #[test]
    fn test_paths_are_escaped() {
        let proxy = ModuleProxy::new("/it's.js", &[], "/.hotweb/client.mjs", "noHMR");
        let src = proxy.render();
        assert!(src.contains("import * as mod from '/it\\'s.js?0';"));
    }

    #[test]
    fn test_escape_js() {
        assert_eq!(escape_js("a\\b"), "a\\\\b");
        assert_eq!(escape_js("\"q\""), "\\\"q\\\"");
        assert_eq!(escape_js("line\nbreak"), "line\\nbreak");
    }
}

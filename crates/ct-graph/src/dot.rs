//! Minimal Graphviz DOT interchange for causal DAGs.
//!
//! Supports `digraph NAME { a -> b -> c; "quoted name"; x -> y [label=...]; }`
//! with `//`, `/* */` and `#` comments. Attribute lists and graph/node/edge
//! default statements are ignored. Subgraphs are rejected.

use ct_core::{Domain, Error, Result, Variable};

use crate::dag::CausalDag;

/// Node declarations and edges parsed from a DOT document, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DotGraph {
    /// Every node mentioned, first occurrence order, deduplicated.
    pub nodes: Vec<String>,
    /// `(cause, effect)` pairs.
    pub edges: Vec<(String, String)>,
}

/// Parse a DOT `digraph`.
pub fn parse_dot(src: &str) -> Result<DotGraph> {
    let cleaned = strip_comments(src);
    let open = cleaned.find('{').ok_or_else(|| dot_err("missing '{'"))?;
    let close = cleaned.rfind('}').ok_or_else(|| dot_err("missing '}'"))?;
    if close < open {
        return Err(dot_err("unbalanced braces"));
    }
    let header = cleaned[..open].trim();
    if !header.split_whitespace().any(|w| w.eq_ignore_ascii_case("digraph")) {
        return Err(dot_err("only 'digraph' documents describe causal graphs"));
    }
    let body = &cleaned[open + 1..close];
    if body.contains('{') || body.contains("subgraph") {
        return Err(dot_err("subgraphs are not supported"));
    }

    let mut out = DotGraph::default();
    for stmt in split_statements(body) {
        let stmt = strip_attributes(&stmt);
        let stmt = stmt.trim();
        if stmt.is_empty() || is_default_statement(stmt) {
            continue;
        }
        let parts = split_arrows(stmt);
        if parts.iter().any(|p| !p.trim_start().starts_with('"') && p.contains("--")) {
            return Err(dot_err("undirected edge '--' in a digraph"));
        }
        let chain: Vec<String> = parts.iter().map(|p| unquote(p)).collect::<Result<_>>()?;
        if chain.len() == 1 && chain[0].contains('=') {
            // Graph attribute such as `rankdir=LR`.
            continue;
        }
        for name in &chain {
            if !out.nodes.contains(name) {
                out.nodes.push(name.clone());
            }
        }
        for pair in chain.windows(2) {
            out.edges.push((pair[0].clone(), pair[1].clone()));
        }
    }
    Ok(out)
}

impl CausalDag {
    /// Parse a DOT document into a new graph of continuous covariates.
    pub fn from_dot(src: &str) -> Result<Self> {
        let mut dag = Self::new();
        dag.extend_from_dot(src)?;
        Ok(dag)
    }

    /// Add the nodes and edges of a DOT document.
    ///
    /// Names not yet registered become continuous covariates, so typed
    /// variables should be registered first. On error the graph is unchanged.
    pub fn extend_from_dot(&mut self, src: &str) -> Result<()> {
        let parsed = parse_dot(src)?;
        let mut next = self.clone();
        for name in &parsed.nodes {
            if !next.contains(name) {
                next.add_variable(Variable::covariate(name.as_str(), Domain::continuous()))?;
            }
        }
        for (a, b) in &parsed.edges {
            next.add_edge(a, b)?;
        }
        *self = next;
        Ok(())
    }

    /// Render as a DOT `digraph`, isolated variables included.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph causal {\n");
        for v in self.variables() {
            let isolated = self.parents(v.name()).map(|p| p.is_empty()).unwrap_or(true)
                && self.children(v.name()).map(|c| c.is_empty()).unwrap_or(true);
            if isolated {
                out.push_str(&format!("  {};\n", quote(v.name())));
            }
        }
        for (a, b) in self.edges() {
            out.push_str(&format!("  {} -> {};\n", quote(a), quote(b)));
        }
        out.push('}');
        out.push('\n');
        out
    }
}

fn dot_err(msg: &str) -> Error {
    Error::InvalidInput(format!("DOT: {msg}"))
}

fn strip_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();
    let mut in_quote = false;
    let mut line_start = true;
    while let Some(c) = chars.next() {
        if in_quote {
            out.push(c);
            if c == '\\' {
                if let Some(n) = chars.next() {
                    out.push(n);
                }
            } else if c == '"' {
                in_quote = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_quote = true;
                out.push(c);
            }
            '#' if line_start => {
                skip_line(&mut chars);
                out.push('\n');
                line_start = true;
                continue;
            }
            '/' if chars.peek() == Some(&'/') => {
                skip_line(&mut chars);
                out.push('\n');
                line_start = true;
                continue;
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
        line_start = c == '\n' || (line_start && c.is_whitespace());
    }
    out
}

fn skip_line(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    for n in chars.by_ref() {
        if n == '\n' {
            break;
        }
    }
}

/// Quote- and bracket-aware scan. `visit` sees each char with whether it
/// belongs to a quoted string and the attribute-list depth it sits at.
/// Quote marks count as quoted; brackets count as inside their list.
fn scan(src: &str, mut visit: impl FnMut(char, bool, usize)) {
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut escaped = false;
    for c in src.chars() {
        if in_quote {
            visit(c, true, depth);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quote = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_quote = true;
                visit(c, true, depth);
            }
            '[' => {
                depth += 1;
                visit(c, false, depth);
            }
            ']' => {
                visit(c, false, depth);
                depth = depth.saturating_sub(1);
            }
            _ => visit(c, false, depth),
        }
    }
}

fn split_statements(body: &str) -> Vec<String> {
    let mut out = vec![String::new()];
    scan(body, |c, quoted, depth| {
        if !quoted && depth == 0 && (c == ';' || c == '\n') {
            out.push(String::new());
        } else if let Some(cur) = out.last_mut() {
            cur.push(c);
        }
    });
    out
}

fn strip_attributes(stmt: &str) -> String {
    let mut out = String::with_capacity(stmt.len());
    scan(stmt, |c, _, depth| {
        if depth == 0 {
            out.push(c);
        }
    });
    out
}

/// Split an edge chain on `->` outside quoted names.
fn split_arrows(stmt: &str) -> Vec<String> {
    let mut out = vec![String::new()];
    let mut prev_dash = false;
    scan(stmt, |c, quoted, depth| {
        let top = !quoted && depth == 0;
        let Some(cur) = out.last_mut() else { return };
        if top && prev_dash && c == '>' {
            cur.pop();
            out.push(String::new());
            prev_dash = false;
            return;
        }
        prev_dash = top && c == '-';
        cur.push(c);
    });
    out
}

fn is_default_statement(stmt: &str) -> bool {
    matches!(stmt, "graph" | "node" | "edge")
}

fn unquote(raw: &str) -> Result<String> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(dot_err("empty node name"));
    }
    if let Some(inner) = s.strip_prefix('"') {
        let inner = inner.strip_suffix('"').ok_or_else(|| dot_err("unterminated quote"))?;
        return Ok(inner.replace("\\\"", "\""));
    }
    if s.contains(char::is_whitespace) {
        return Err(dot_err(&format!("unquoted name with whitespace: '{s}'")));
    }
    Ok(s.to_string())
}

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\\\""))
}

//! Minimal devicetree source model.
//!
//! Just enough structure to assemble and render a ZMK keymap overlay:
//! labelled nodes, the property value kinds ZMK uses, and verbatim blocks
//! for pre-formatted content like binding matrices and comments.

use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropValue {
    /// Rendered verbatim after `=`; the caller supplies brackets or quotes.
    Raw(String),
    Str(String),
    Int(i64),
    /// A flag property with no value.
    Bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeChild {
    Node(Node),
    /// A `/* ... */` block rendered line by line at child indent.
    Comment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    name: String,
    label: Option<String>,
    properties: Vec<(String, PropValue)>,
    children: Vec<NodeChild>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            properties: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn prop(mut self, name: impl Into<String>, value: PropValue) -> Self {
        self.properties.push((name.into(), value));
        self
    }

    pub fn raw_prop(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.prop(name, PropValue::Raw(value.into()))
    }

    pub fn str_prop(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.prop(name, PropValue::Str(value.into()))
    }

    pub fn int_prop(self, name: impl Into<String>, value: i64) -> Self {
        self.prop(name, PropValue::Int(value))
    }

    pub fn flag(self, name: impl Into<String>) -> Self {
        self.prop(name, PropValue::Bool)
    }

    pub fn child(mut self, node: Node) -> Self {
        self.children.push(NodeChild::Node(node));
        self
    }

    pub fn comment(mut self, text: impl Into<String>) -> Self {
        self.children.push(NodeChild::Comment(text.into()));
        self
    }

    pub fn get_prop(&self, name: &str) -> Option<&PropValue> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Renders the node at top level, tab-indented.
    pub fn format(&self) -> String {
        let mut out = String::new();
        self.write(&mut out, 0);
        out
    }

    fn write(&self, out: &mut String, depth: usize) {
        let indent = "\t".repeat(depth);
        match &self.label {
            Some(label) => {
                let _ = writeln!(out, "{indent}{label}: {} {{", self.name);
            }
            None => {
                let _ = writeln!(out, "{indent}{} {{", self.name);
            }
        }

        let inner = "\t".repeat(depth + 1);
        for (name, value) in &self.properties {
            match value {
                PropValue::Raw(v) => {
                    let _ = writeln!(out, "{inner}{name} = {v};");
                }
                PropValue::Str(v) => {
                    let _ = writeln!(out, "{inner}{name} = \"{v}\";");
                }
                PropValue::Int(v) => {
                    let _ = writeln!(out, "{inner}{name} = <{v}>;");
                }
                PropValue::Bool => {
                    let _ = writeln!(out, "{inner}{name};");
                }
            }
        }

        for child in &self.children {
            match child {
                NodeChild::Node(node) => {
                    out.push('\n');
                    node.write(out, depth + 1);
                }
                NodeChild::Comment(text) => {
                    out.push('\n');
                    let _ = writeln!(out, "{inner}/*");
                    for line in text.lines() {
                        let _ = writeln!(out, "{inner} * {}", line.trim_end());
                    }
                    let _ = writeln!(out, "{inner} */");
                }
            }
        }

        let _ = writeln!(out, "{indent}}};");
    }
}

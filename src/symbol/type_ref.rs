use serde::{Deserialize, Serialize};

/// A written type, e.g. `Map<String, List<Account>>` or `Integer[]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeReference {
    pub name: String,
    pub type_arguments: Vec<TypeReference>,
    pub is_array: bool,
}

impl TypeReference {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_arguments: Vec::new(),
            is_array: false,
        }
    }

    /// Parse the textual form of a type. Malformed input degrades to a plain
    /// name holding the trimmed text; the parser upstream owns real diagnostics.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let (text, is_array) = match text.strip_suffix("[]") {
            Some(inner) => (inner.trim_end(), true),
            None => (text, false),
        };

        let Some(open) = text.find('<') else {
            return Self {
                name: text.to_string(),
                type_arguments: Vec::new(),
                is_array,
            };
        };

        if !text.ends_with('>') {
            return Self {
                name: text.to_string(),
                type_arguments: Vec::new(),
                is_array,
            };
        }

        let name = text[..open].trim().to_string();
        let inner = &text[open + 1..text.len() - 1];
        let type_arguments = split_top_level(inner)
            .into_iter()
            .filter(|part| !part.trim().is_empty())
            .map(Self::parse)
            .collect();

        Self {
            name,
            type_arguments,
            is_array,
        }
    }

    /// Last dotted segment of the name (`System.Exception` -> `Exception`).
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Namespace or outer-type qualifier, if the name is dotted.
    pub fn qualifier(&self) -> Option<&str> {
        self.name.rsplit_once('.').map(|(q, _)| q)
    }

    /// This type and every nested type argument, depth first.
    pub fn walk(&self) -> Vec<&TypeReference> {
        let mut out = vec![self];
        for arg in &self.type_arguments {
            out.extend(arg.walk());
        }
        out
    }

    pub fn display(&self) -> String {
        let mut out = self.name.clone();
        if !self.type_arguments.is_empty() {
            let args: Vec<String> = self.type_arguments.iter().map(Self::display).collect();
            out.push('<');
            out.push_str(&args.join(","));
            out.push('>');
        }
        if self.is_array {
            out.push_str("[]");
        }
        out
    }
}

fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in text.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

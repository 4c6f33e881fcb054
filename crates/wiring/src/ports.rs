use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Which side of a module a port sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

/// Ports a module exposes independently of any wiring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModulePorts {
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl ModulePorts {
    pub fn side(&self, direction: PortDirection) -> &[String] {
        match direction {
            PortDirection::Input => &self.inputs,
            PortDirection::Output => &self.outputs,
        }
    }

    fn side_mut(&mut self, direction: PortDirection) -> &mut Vec<String> {
        match direction {
            PortDirection::Input => &mut self.inputs,
            PortDirection::Output => &mut self.outputs,
        }
    }
}

/// The `module_ports` control value: alias -> declared ports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortDeclarations(pub BTreeMap<String, ModulePorts>);

impl PortDeclarations {
    /// Lenient parse: anything that is not a JSON object yields an empty
    /// set, and malformed module records are read as far as they go.
    pub fn parse(text: &str) -> Self {
        let Ok(Value::Object(modules)) =
            serde_json::from_str::<Value>(text)
        else {
            return Self::default();
        };
        let mut declarations = BTreeMap::new();
        for (alias, record) in modules {
            declarations.insert(
                alias,
                ModulePorts {
                    inputs: string_list(record.get("inputs")),
                    outputs: string_list(record.get("outputs")),
                },
            );
        }
        Self(declarations)
    }

    pub fn get(&self, alias: &str) -> Option<&ModulePorts> {
        self.0.get(alias)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModulePorts)> {
        self.0.iter().map(|(alias, ports)| (alias.as_str(), ports))
    }

    /// Insert `port` on the given side of `alias`, keeping that side sorted
    /// and free of duplicates. Returns whether anything changed.
    pub fn ensure_port(
        &mut self,
        alias: &str,
        direction: PortDirection,
        port: &str,
    ) -> bool {
        let side = self
            .0
            .entry(alias.to_string())
            .or_default()
            .side_mut(direction);
        if side.iter().any(|existing| existing == port) {
            return false;
        }
        side.push(port.to_string());
        side.sort();
        side.dedup();
        true
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self)
            .unwrap_or_else(|_| String::from("{}"))
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter(|item| !item.is_null())
        .map(|item| match item {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_lenient() {
        assert!(PortDeclarations::parse("not json").0.is_empty());
        assert!(PortDeclarations::parse("[1, 2]").0.is_empty());

        let parsed = PortDeclarations::parse(
            r#"{"prey": {"outputs": ["population", 3]}, "odd": 5}"#,
        );
        let prey = parsed.get("prey").unwrap();
        assert_eq!(prey.outputs, vec!["population", "3"]);
        assert!(prey.inputs.is_empty());
        assert_eq!(parsed.get("odd"), Some(&ModulePorts::default()));
    }

    #[test]
    fn test_ensure_port_keeps_sorted_and_unique() {
        let mut ports = PortDeclarations::default();
        assert!(ports.ensure_port("m", PortDirection::Input, "zeta"));
        assert!(ports.ensure_port("m", PortDirection::Input, "alpha"));
        assert!(!ports.ensure_port("m", PortDirection::Input, "zeta"));
        assert!(ports.ensure_port("m", PortDirection::Output, "out"));

        let module = ports.get("m").unwrap();
        assert_eq!(module.inputs, vec!["alpha", "zeta"]);
        assert_eq!(module.side(PortDirection::Output), ["out"]);
    }

    #[test]
    fn test_json_round_trip() {
        let mut ports = PortDeclarations::default();
        ports.ensure_port("a", PortDirection::Output, "x");
        let text = ports.to_json_pretty();
        assert_eq!(PortDeclarations::parse(&text), ports);
    }
}

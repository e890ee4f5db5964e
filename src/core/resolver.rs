//! Template resolution and dependency ordering.
//!
//! Resolves `{{params.key}}` and `{{ref.logical_name}}` templates in
//! parameter values, and computes a topological order over depends_on edges
//! using Kahn's algorithm. Ties are broken by declaration order so runs are
//! deterministic and match the manifest.

use super::error::{Error, Result};
use super::types::{Manifest, ResourceSpec};
use indexmap::IndexMap;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Convert a parameter value to a string for template interpolation.
pub fn value_to_string(val: &serde_yaml_ng::Value) -> String {
    match val {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        serde_yaml_ng::Value::Null => String::new(),
        other => format!("{:?}", other),
    }
}

/// Resolve all template variables in a string.
///
/// `refs` maps dependency logical names to their provider ids; the
/// provisioner fills it only after those dependencies are created.
pub fn resolve_template(
    template: &str,
    params: &HashMap<String, serde_yaml_ng::Value>,
    refs: &IndexMap<String, String>,
) -> Result<String> {
    let mut result = template.to_string();
    let mut start = 0;

    while let Some(open) = result[start..].find("{{") {
        let open = start + open;
        let close = result[open..]
            .find("}}")
            .ok_or_else(|| Error::Template(format!("unclosed template at position {}", open)))?;
        let close = open + close + 2;
        let var = result[open + 2..close - 2].trim();

        let value = if let Some(param_key) = var.strip_prefix("params.") {
            params
                .get(param_key)
                .map(value_to_string)
                .ok_or_else(|| Error::Template(format!("unknown param: {}", param_key)))?
        } else if let Some(logical) = var.strip_prefix("ref.") {
            refs.get(logical)
                .cloned()
                .ok_or_else(|| Error::Template(format!("unresolved ref: {}", logical)))?
        } else {
            return Err(Error::Template(format!("unknown template variable: {}", var)));
        };

        result.replace_range(open..close, &value);
        start = open + value.len();
    }

    Ok(result)
}

/// Resolve templates in every string inside a parameter value, recursively
/// through sequences and mappings.
fn resolve_value(
    value: &serde_yaml_ng::Value,
    params: &HashMap<String, serde_yaml_ng::Value>,
    refs: &IndexMap<String, String>,
) -> Result<serde_yaml_ng::Value> {
    use serde_yaml_ng::Value;
    match value {
        Value::String(s) => Ok(Value::String(resolve_template(s, params, refs)?)),
        Value::Sequence(items) => {
            let resolved: Result<Vec<Value>> = items
                .iter()
                .map(|v| resolve_value(v, params, refs))
                .collect();
            Ok(Value::Sequence(resolved?))
        }
        Value::Mapping(map) => {
            let mut resolved = serde_yaml_ng::Mapping::new();
            for (k, v) in map {
                resolved.insert(k.clone(), resolve_value(v, params, refs)?);
            }
            Ok(Value::Mapping(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// Resolve all templates in a resource's parameters.
pub fn resolve_parameters(
    spec: &ResourceSpec,
    params: &HashMap<String, serde_yaml_ng::Value>,
    refs: &IndexMap<String, String>,
) -> Result<IndexMap<String, serde_yaml_ng::Value>> {
    let mut resolved = IndexMap::with_capacity(spec.parameters.len());
    for (key, value) in &spec.parameters {
        resolved.insert(key.clone(), resolve_value(value, params, refs)?);
    }
    Ok(resolved)
}

/// Topologically sort nodes given as `(id, dependencies)` pairs in input
/// order. Kahn's algorithm; among ready nodes the earliest-declared wins.
pub fn topo_sort(nodes: &[(String, Vec<String>)]) -> Result<Vec<String>> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];

    for (i, (id, deps)) in nodes.iter().enumerate() {
        for dep in deps {
            let dep_idx = *index.get(dep.as_str()).ok_or_else(|| {
                Error::UnknownDependency {
                    resource: id.clone(),
                    dependency: dep.clone(),
                }
            })?;
            dependents[dep_idx].push(i);
            in_degree[i] += 1;
        }
    }

    // Min-heap on declaration index keeps ties in input order
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(Reverse(current)) = ready.pop() {
        order.push(nodes[current].0.clone());
        for &next in &dependents[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() != nodes.len() {
        let stuck: Vec<&str> = nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, (id, _))| id.as_str())
            .collect();
        return Err(Error::DependencyCycle(stuck.join(", ")));
    }

    Ok(order)
}

/// Topological execution order for a manifest's resources.
pub fn execution_order(manifest: &Manifest) -> Result<Vec<String>> {
    let nodes: Vec<(String, Vec<String>)> = manifest
        .resources
        .iter()
        .map(|(id, spec)| (id.clone(), spec.depends_on.clone()))
        .collect();
    topo_sort(&nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn no_refs() -> IndexMap<String, String> {
        IndexMap::new()
    }

    #[test]
    fn test_resolve_params() {
        let mut params = HashMap::new();
        params.insert(
            "cidr".to_string(),
            serde_yaml_ng::Value::String("10.0.0.0/24".to_string()),
        );
        let result = resolve_template("block={{params.cidr}}", &params, &no_refs()).unwrap();
        assert_eq!(result, "block=10.0.0.0/24");
    }

    #[test]
    fn test_resolve_ref() {
        let mut refs = IndexMap::new();
        refs.insert("v1".to_string(), "vpc-00000001".to_string());
        let result = resolve_template("{{ref.v1}}", &HashMap::new(), &refs).unwrap();
        assert_eq!(result, "vpc-00000001");
    }

    #[test]
    fn test_resolve_unknown_param() {
        let result = resolve_template("{{params.missing}}", &HashMap::new(), &no_refs());
        assert!(result.unwrap_err().to_string().contains("unknown param"));
    }

    #[test]
    fn test_resolve_unresolved_ref() {
        let result = resolve_template("{{ref.ghost}}", &HashMap::new(), &no_refs());
        assert!(result.unwrap_err().to_string().contains("unresolved ref"));
    }

    #[test]
    fn test_resolve_unclosed() {
        let result = resolve_template("{{params.x", &HashMap::new(), &no_refs());
        assert!(result.unwrap_err().to_string().contains("unclosed"));
    }

    #[test]
    fn test_resolve_multiple() {
        let mut params = HashMap::new();
        params.insert("a".to_string(), serde_yaml_ng::Value::String("X".into()));
        let mut refs = IndexMap::new();
        refs.insert("b".to_string(), "Y".to_string());
        let result = resolve_template("{{params.a}}-{{ref.b}}", &params, &refs).unwrap();
        assert_eq!(result, "X-Y");
    }

    #[test]
    fn test_resolve_parameters_nested() {
        let spec: crate::core::types::ResourceSpec = serde_yaml_ng::from_str(
            r#"
kind: route_table
name: public-routes
parameters:
  vpc_id: "{{ref.v1}}"
  routes:
    - destination: 0.0.0.0/0
      gateway_id: "{{ref.igw1}}"
"#,
        )
        .unwrap();
        let mut refs = IndexMap::new();
        refs.insert("v1".to_string(), "vpc-01".to_string());
        refs.insert("igw1".to_string(), "igw-02".to_string());

        let resolved = resolve_parameters(&spec, &HashMap::new(), &refs).unwrap();
        assert_eq!(
            resolved["vpc_id"],
            serde_yaml_ng::Value::String("vpc-01".into())
        );
        let routes = resolved["routes"].as_sequence().unwrap();
        let gateway = routes[0].get("gateway_id").unwrap();
        assert_eq!(gateway, &serde_yaml_ng::Value::String("igw-02".into()));
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(
            value_to_string(&serde_yaml_ng::Value::String("hi".into())),
            "hi"
        );
        assert_eq!(value_to_string(&serde_yaml_ng::Value::Bool(true)), "true");
        assert_eq!(value_to_string(&serde_yaml_ng::Value::Null), "");
    }

    fn nodes(spec: &[(&str, &[&str])]) -> Vec<(String, Vec<String>)> {
        spec.iter()
            .map(|(id, deps)| {
                (
                    id.to_string(),
                    deps.iter().map(|d| d.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_topo_linear() {
        let order = topo_sort(&nodes(&[("a", &[]), ("b", &["a"]), ("c", &["b"])])).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_topo_ties_keep_input_order() {
        // zebra declared before alpha; both independent
        let order = topo_sort(&nodes(&[("zebra", &[]), ("alpha", &[])])).unwrap();
        assert_eq!(order, vec!["zebra", "alpha"]);
    }

    #[test]
    fn test_topo_diamond() {
        let order = topo_sort(&nodes(&[
            ("top", &[]),
            ("right", &["top"]),
            ("left", &["top"]),
            ("bottom", &["left", "right"]),
        ]))
        .unwrap();
        assert_eq!(order, vec!["top", "right", "left", "bottom"]);
    }

    #[test]
    fn test_topo_cycle() {
        let err = topo_sort(&nodes(&[("a", &["b"]), ("b", &["a"])])).unwrap_err();
        match err {
            Error::DependencyCycle(members) => {
                assert!(members.contains('a'));
                assert!(members.contains('b'));
            }
            other => panic!("expected DependencyCycle, got {:?}", other),
        }
    }

    #[test]
    fn test_topo_unknown_dependency() {
        let err = topo_sort(&nodes(&[("a", &["ghost"])])).unwrap_err();
        assert!(matches!(err, Error::UnknownDependency { .. }));
    }

    #[test]
    fn test_execution_order_vpc_example() {
        let manifest: Manifest = serde_yaml_ng::from_str(
            r#"
version: "1.0"
name: net
resources:
  v1:
    kind: vpc
    name: net-vpc
  s1:
    kind: subnet
    name: public-a
    depends_on: [v1]
  sg1:
    kind: security_group
    name: web-sg
    depends_on: [v1]
"#,
        )
        .unwrap();
        let order = execution_order(&manifest).unwrap();
        assert_eq!(order[0], "v1");
        // s1 and sg1 both depend only on v1; declaration order holds
        assert_eq!(order[1], "s1");
        assert_eq!(order[2], "sg1");
    }

    proptest! {
        /// Every dependency appears before its dependent, for arbitrary DAGs.
        /// Edges only point from later-declared nodes to earlier ones, so the
        /// graph is acyclic by construction.
        #[test]
        fn prop_topo_respects_dependencies(n in 2usize..12, seed in any::<u64>()) {
            let mut input = Vec::new();
            for i in 0..n {
                let mut deps = Vec::new();
                for j in 0..i {
                    if (seed >> ((i * 7 + j) % 63)) & 1 == 1 {
                        deps.push(format!("r{}", j));
                    }
                }
                input.push((format!("r{}", i), deps));
            }

            let order = topo_sort(&input).unwrap();
            prop_assert_eq!(order.len(), n);

            let position: HashMap<&str, usize> = order
                .iter()
                .enumerate()
                .map(|(pos, id)| (id.as_str(), pos))
                .collect();
            for (id, deps) in &input {
                for dep in deps {
                    prop_assert!(position[dep.as_str()] < position[id.as_str()]);
                }
            }
        }
    }
}

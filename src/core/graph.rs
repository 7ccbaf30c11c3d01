//! Service dependency ordering and host deploy ordering.

use crate::domain::model::{Host, Service};
use crate::utils::error::{CompileError, Result};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Orders services so that every dependency precedes its dependents (Kahn's algorithm).
///
/// Among services that are ready at the same time the one declared first wins, so
/// identical input always yields identical output.
pub fn resolve(services: &[Service]) -> Result<Vec<String>> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(services.len());
    for (i, svc) in services.iter().enumerate() {
        if index.insert(svc.name.as_str(), i).is_some() {
            return Err(CompileError::InvalidConfigValueError {
                field: "services.name".to_string(),
                value: svc.name.clone(),
                reason: "Name is declared more than once".to_string(),
            });
        }
    }

    // dependents[b] holds every a with `a depends_on b`
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); services.len()];
    let mut in_degree = vec![0usize; services.len()];

    for (a, svc) in services.iter().enumerate() {
        let mut seen = HashSet::new();
        for dep in &svc.depends_on {
            if !seen.insert(dep.as_str()) {
                continue;
            }
            let b = *index.get(dep.as_str()).ok_or_else(|| {
                CompileError::config(
                    format!("services.{}.depends_on", svc.name),
                    format!("Dependency service '{}' not found", dep),
                )
            })?;
            dependents[b].push(a);
            in_degree[a] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(i, _)| Reverse(i))
        .collect();
    let mut order = Vec::with_capacity(services.len());

    while let Some(Reverse(current)) = ready.pop() {
        order.push(current);
        for &next in &dependents[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() < services.len() {
        let mut unresolved = vec![true; services.len()];
        for &i in &order {
            unresolved[i] = false;
        }
        let on_cycle = cycle_members(&dependents, &unresolved);

        let mut cycle = Vec::new();
        let mut blocked = Vec::new();
        for (i, svc) in services.iter().enumerate() {
            if !unresolved[i] {
                continue;
            }
            if on_cycle[i] {
                cycle.push(svc.name.clone());
            } else {
                blocked.push(svc.name.clone());
            }
        }

        tracing::debug!(?cycle, ?blocked, "dependency graph is cyclic");
        return Err(CompileError::CyclicDependency { cycle, blocked });
    }

    Ok(order.into_iter().map(|i| services[i].name.clone()).collect())
}

/// Marks the nodes of `scope` that lie on a cycle: members of a strongly connected
/// component with more than one node, or nodes with a self edge.
fn cycle_members(edges: &[Vec<usize>], scope: &[bool]) -> Vec<bool> {
    let mut tarjan = Tarjan {
        edges,
        scope,
        index: vec![None; edges.len()],
        low: vec![0; edges.len()],
        on_stack: vec![false; edges.len()],
        stack: Vec::new(),
        next: 0,
        cyclic: vec![false; edges.len()],
    };

    for v in 0..edges.len() {
        if scope[v] && tarjan.index[v].is_none() {
            tarjan.visit(v);
        }
    }
    tarjan.cyclic
}

struct Tarjan<'a> {
    edges: &'a [Vec<usize>],
    scope: &'a [bool],
    index: Vec<Option<usize>>,
    low: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next: usize,
    cyclic: Vec<bool>,
}

impl Tarjan<'_> {
    fn visit(&mut self, v: usize) {
        self.index[v] = Some(self.next);
        self.low[v] = self.next;
        self.next += 1;
        self.stack.push(v);
        self.on_stack[v] = true;

        let edges = self.edges;
        for &w in &edges[v] {
            if !self.scope[w] {
                continue;
            }
            match self.index[w] {
                None => {
                    self.visit(w);
                    self.low[v] = self.low[v].min(self.low[w]);
                }
                Some(iw) if self.on_stack[w] => {
                    self.low[v] = self.low[v].min(iw);
                }
                Some(_) => {}
            }
        }

        if Some(self.low[v]) == self.index[v] {
            let mut component = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            if component.len() > 1 || edges[v].contains(&v) {
                for w in component {
                    self.cyclic[w] = true;
                }
            }
        }
    }
}

/// Host names sorted by `deploy_order`; hosts without one go last, ties keep declaration order.
pub fn host_deploy_order(hosts: &[Host]) -> Vec<String> {
    let mut ordered: Vec<&Host> = hosts.iter().collect();
    ordered.sort_by_key(|h| (h.deploy_order.is_none(), h.deploy_order.unwrap_or(0)));
    ordered.into_iter().map(|h| h.name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn svc(name: &str, deps: &[&str]) -> Service {
        Service {
            name: name.to_string(),
            host: "vm1".to_string(),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            params: Map::new(),
        }
    }

    fn host(name: &str, order: Option<u32>) -> Host {
        Host {
            name: name.to_string(),
            ip: "10.0.0.2/24".to_string(),
            gateway: None,
            ssh_user: None,
            cores: 1,
            memory: 512,
            disk: 8,
            deploy_order: order,
            data_dir: "/opt/homelab".to_string(),
            template: None,
            extra: Map::new(),
        }
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_linear_chain() {
        let services = vec![svc("db", &[]), svc("app", &["db"]), svc("web", &["app"])];
        assert_eq!(resolve(&services).unwrap(), vec!["db", "app", "web"]);
    }

    #[test]
    fn test_declared_out_of_order() {
        let services = vec![svc("web", &["app"]), svc("app", &["db"]), svc("db", &[])];
        assert_eq!(resolve(&services).unwrap(), vec!["db", "app", "web"]);
    }

    #[test]
    fn test_ready_ties_follow_declaration_order() {
        // after `a`, both `b` and `c` are ready; `b` was declared first
        let services = vec![svc("a", &[]), svc("b", &["a"]), svc("c", &[])];
        assert_eq!(resolve(&services).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_two_node_cycle() {
        let services = vec![svc("a", &["b"]), svc("b", &["a"])];
        match resolve(&services) {
            Err(CompileError::CyclicDependency { cycle, blocked }) => {
                assert_eq!(cycle, vec!["a", "b"]);
                assert!(blocked.is_empty());
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_excludes_downstream_services() {
        let services = vec![
            svc("ok", &[]),
            svc("x", &["y"]),
            svc("y", &["z"]),
            svc("z", &["x"]),
            svc("tail", &["z"]),
        ];
        match resolve(&services) {
            Err(CompileError::CyclicDependency { cycle, blocked }) => {
                assert_eq!(cycle, vec!["x", "y", "z"]);
                assert_eq!(blocked, vec!["tail"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_node_between_two_cycles_is_blocked_not_cyclic() {
        let services = vec![
            svc("a", &["b"]),
            svc("b", &["a"]),
            svc("bridge", &["a"]),
            svc("c", &["bridge", "d"]),
            svc("d", &["c"]),
        ];
        match resolve(&services) {
            Err(CompileError::CyclicDependency { cycle, blocked }) => {
                assert_eq!(cycle, vec!["a", "b", "c", "d"]);
                assert_eq!(blocked, vec!["bridge"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let services = vec![svc("solo", &["solo"]), svc("free", &[])];
        match resolve(&services) {
            Err(CompileError::CyclicDependency { cycle, .. }) => assert_eq!(cycle, vec!["solo"]),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_dependency_entries_collapse() {
        let services = vec![svc("db", &[]), svc("app", &["db", "db"])];
        assert_eq!(resolve(&services).unwrap(), vec!["db", "app"]);
    }

    #[test]
    fn test_unknown_dependency_is_structural() {
        let services = vec![svc("app", &["ghost"])];
        let err = resolve(&services).unwrap_err();
        assert!(err.is_structural());
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_generated_dags_respect_every_edge() {
        // small deterministic LCG so the graphs vary without a rand dependency
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as usize
        };

        for round in 0..50 {
            let n = 2 + round % 12;
            // a random permutation decides the hidden topological rank
            let mut rank: Vec<usize> = (0..n).collect();
            for i in (1..n).rev() {
                rank.swap(i, next() % (i + 1));
            }
            let services: Vec<Service> = (0..n)
                .map(|i| {
                    let deps: Vec<String> = (0..n)
                        .filter(|&j| rank[j] < rank[i] && next() % 3 == 0)
                        .map(|j| format!("s{}", j))
                        .collect();
                    let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
                    svc(&format!("s{}", i), &deps)
                })
                .collect();

            let order = resolve(&services).unwrap();
            assert_eq!(order.len(), n);
            for s in &services {
                for dep in &s.depends_on {
                    assert!(position(&order, dep) < position(&order, &s.name));
                }
            }
            assert_eq!(order, resolve(&services).unwrap());
        }
    }

    #[test]
    fn test_host_deploy_order() {
        let hosts = vec![
            host("late", None),
            host("second", Some(20)),
            host("first", Some(10)),
            host("also-late", None),
            host("second-tie", Some(20)),
        ];
        assert_eq!(
            host_deploy_order(&hosts),
            vec!["first", "second", "second-tie", "late", "also-late"]
        );
    }

    #[test]
    fn test_missing_deploy_order_sorts_after_large_values() {
        let hosts = vec![host("none", None), host("big", Some(100_000))];
        assert_eq!(host_deploy_order(&hosts), vec!["big", "none"]);
    }
}

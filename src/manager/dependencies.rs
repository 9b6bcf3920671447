//! Install and uninstall planning over the package index.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::index::{PackageIndex, ReleaseInfo, normalize_name};

/// One entry of an install plan.
#[derive(Debug, Clone)]
pub struct PlannedPackage {
    pub info: ReleaseInfo,
    /// True for the package the caller asked for, as opposed to a dependency.
    pub target: bool,
}

/// Plans installs and uninstalls against the index and the server state.
pub struct DependencyResolver<'a> {
    index: &'a dyn PackageIndex,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(index: &'a dyn PackageIndex) -> Self {
        Self { index }
    }

    /// Resolve the part of `name`'s dependency closure that is missing from
    /// the server, dependency-first. The target itself is always part of
    /// the plan; callers guard against redundant installs beforehand.
    ///
    /// `server` maps normalized distribution names to installed versions.
    /// Pinned requirements resolve to their pin, everything else to the
    /// index's latest release.
    pub async fn plan_install(
        &self,
        name: &str,
        version: Option<&str>,
        server: &BTreeMap<String, String>,
    ) -> Result<Vec<PlannedPackage>> {
        let target = normalize_name(name);
        let mut resolved: BTreeMap<String, ReleaseInfo> = BTreeMap::new();
        let mut skipped: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<(String, Option<String>)> = VecDeque::new();
        queue.push_back((target.clone(), version.map(String::from)));

        while let Some((pkg, pin)) = queue.pop_front() {
            if resolved.contains_key(&pkg) || skipped.contains(&pkg) {
                continue;
            }
            if pkg != target && server.contains_key(&pkg) {
                debug!("{} is already installed on the server, skipping", pkg);
                skipped.insert(pkg);
                continue;
            }
            let info = match &pin {
                Some(v) => self
                    .index
                    .release(&pkg, v)
                    .await
                    .with_context(|| format!("Failed to resolve {}=={} from the index", pkg, v))?,
                None => self
                    .index
                    .latest(&pkg)
                    .await
                    .with_context(|| format!("Failed to resolve {} from the index", pkg))?,
            };
            for req in &info.requires {
                queue.push_back((req.name.clone(), req.pin.clone()));
            }
            resolved.insert(pkg, info);
        }

        Ok(order_dependencies_first(resolved, &target))
    }

    /// Compute which tracked libraries to drop when uninstalling `name`:
    /// the package itself plus every dependency in its closure that no
    /// other tracked library needs. Dependents come before their
    /// dependencies in the returned list, so drops never leave a tracked
    /// row with a missing dependency mid-way.
    pub async fn plan_uninstall(
        &self,
        name: &str,
        server: &BTreeMap<String, String>,
        tracked: &[String],
    ) -> Result<Vec<String>> {
        let target = normalize_name(name);
        let tracked: BTreeSet<String> = tracked.iter().map(|n| normalize_name(n)).collect();

        // Requirement edges between tracked libraries, resolved at the
        // versions the server reports.
        let mut requires: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for pkg in &tracked {
            let info = match self.release_for(pkg, server).await {
                Ok(info) => info,
                Err(err) => {
                    warn!(
                        "Could not resolve metadata for {}: {:#}. Its dependencies will be kept.",
                        pkg, err
                    );
                    continue;
                }
            };
            requires.insert(
                pkg.clone(),
                info.requires
                    .iter()
                    .map(|r| r.name.clone())
                    .filter(|n| tracked.contains(n))
                    .collect(),
            );
        }

        let closure = reachable(&requires, &target);

        // Everything a tracked library outside the closure still needs
        // stays installed.
        let mut keep: BTreeSet<String> = BTreeSet::new();
        for root in tracked
            .iter()
            .filter(|r| **r != target && !closure.contains(*r))
        {
            keep.extend(reachable(&requires, root));
        }

        let mut drops = Vec::new();
        for pkg in dependents_first(&requires, &closure) {
            if pkg == target || !keep.contains(&pkg) {
                drops.push(pkg);
            }
        }
        Ok(drops)
    }

    async fn release_for(
        &self,
        pkg: &str,
        server: &BTreeMap<String, String>,
    ) -> Result<ReleaseInfo> {
        match server.get(pkg) {
            Some(version) => self.index.release(pkg, version).await,
            None => self.index.latest(pkg).await,
        }
    }
}

/// Order resolved packages so every dependency precedes its dependents.
/// Ties break by name so the order is deterministic; cycles (rare but legal
/// on the index) are appended in name order.
fn order_dependencies_first(
    mut resolved: BTreeMap<String, ReleaseInfo>,
    target: &str,
) -> Vec<PlannedPackage> {
    let names: Vec<String> = resolved.keys().cloned().collect();
    let present: BTreeSet<String> = names.iter().cloned().collect();

    let mut deps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (name, info) in &resolved {
        let entry = deps.entry(name.clone()).or_default();
        for req in &info.requires {
            if present.contains(&req.name) && req.name != *name {
                entry.insert(req.name.clone());
            }
        }
    }

    let mut ordered: Vec<String> = Vec::new();
    let mut placed: BTreeSet<String> = BTreeSet::new();
    while placed.len() < names.len() {
        let mut progressed = false;
        for name in &names {
            if placed.contains(name) {
                continue;
            }
            let ready = deps
                .get(name)
                .is_none_or(|d| d.iter().all(|dep| placed.contains(dep)));
            if ready {
                ordered.push(name.clone());
                placed.insert(name.clone());
                progressed = true;
            }
        }
        if !progressed {
            for name in &names {
                if placed.insert(name.clone()) {
                    ordered.push(name.clone());
                }
            }
        }
    }

    ordered
        .into_iter()
        .filter_map(|name| {
            let is_target = name == target;
            resolved.remove(&name).map(|info| PlannedPackage {
                info,
                target: is_target,
            })
        })
        .collect()
}

/// Names reachable from `root` over requirement edges, including `root`.
fn reachable(requires: &BTreeMap<String, BTreeSet<String>>, root: &str) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut stack = vec![root.to_string()];
    while let Some(pkg) = stack.pop() {
        if !seen.insert(pkg.clone()) {
            continue;
        }
        if let Some(deps) = requires.get(&pkg) {
            for dep in deps {
                if !seen.contains(dep) {
                    stack.push(dep.clone());
                }
            }
        }
    }
    seen
}

/// Topological order of `members` with dependents before dependencies.
fn dependents_first(
    requires: &BTreeMap<String, BTreeSet<String>>,
    members: &BTreeSet<String>,
) -> Vec<String> {
    let mut ordered = Vec::new();
    let mut placed: BTreeSet<String> = BTreeSet::new();
    while placed.len() < members.len() {
        let mut progressed = false;
        for pkg in members {
            if placed.contains(pkg) {
                continue;
            }
            let ready = requires.get(pkg).is_none_or(|deps| {
                deps.iter()
                    .filter(|d| members.contains(*d))
                    .all(|d| placed.contains(d))
            });
            if ready {
                ordered.push(pkg.clone());
                placed.insert(pkg.clone());
                progressed = true;
            }
        }
        if !progressed {
            for pkg in members {
                if placed.insert(pkg.clone()) {
                    ordered.push(pkg.clone());
                }
            }
        }
    }
    // Dependency-first so far; reverse to put dependents first.
    ordered.reverse();
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{DistFile, DistKind, MockPackageIndex, Requirement};
    use mockall::predicate::eq;

    fn release(name: &str, version: &str, requires: &[&str]) -> ReleaseInfo {
        ReleaseInfo {
            name: name.to_string(),
            version: version.to_string(),
            requires: requires
                .iter()
                .filter_map(|entry| Requirement::parse(entry))
                .collect(),
            files: vec![DistFile {
                filename: format!("{}-{}-py3-none-any.whl", name, version),
                url: format!("https://files.example/{}-{}-py3-none-any.whl", name, version),
                kind: DistKind::Wheel,
            }],
        }
    }

    fn expect_latest(index: &mut MockPackageIndex, info: ReleaseInfo) {
        index
            .expect_latest()
            .with(eq(info.name.clone()))
            .returning(move |_| Ok(info.clone()));
    }

    fn expect_release(index: &mut MockPackageIndex, info: ReleaseInfo) {
        index
            .expect_release()
            .with(eq(info.name.clone()), eq(info.version.clone()))
            .returning(move |_, _| Ok(info.clone()));
    }

    #[tokio::test]
    async fn test_plan_install_transitive_closure_dependency_first() {
        let mut index = MockPackageIndex::new();
        expect_latest(&mut index, release("latex", "0.7.0", &["funcsigs", "shutilwhich"]));
        expect_latest(&mut index, release("funcsigs", "1.0.2", &[]));
        expect_latest(&mut index, release("shutilwhich", "1.1.0", &[]));

        let resolver = DependencyResolver::new(&index);
        let plan = resolver
            .plan_install("latex", None, &BTreeMap::new())
            .await
            .unwrap();

        let names: Vec<&str> = plan.iter().map(|p| p.info.name.as_str()).collect();
        assert_eq!(names, vec!["funcsigs", "shutilwhich", "latex"]);
        assert!(plan[2].target);
        assert!(!plan[0].target && !plan[1].target);
    }

    #[tokio::test]
    async fn test_plan_install_chain_order() {
        let mut index = MockPackageIndex::new();
        expect_latest(&mut index, release("a", "1.0", &["b"]));
        expect_latest(&mut index, release("b", "1.0", &["c"]));
        expect_latest(&mut index, release("c", "1.0", &[]));

        let resolver = DependencyResolver::new(&index);
        let plan = resolver
            .plan_install("a", None, &BTreeMap::new())
            .await
            .unwrap();

        let names: Vec<&str> = plan.iter().map(|p| p.info.name.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_plan_install_skips_packages_on_server() {
        let mut index = MockPackageIndex::new();
        expect_latest(&mut index, release("latex", "0.7.0", &["funcsigs", "six"]));
        expect_latest(&mut index, release("funcsigs", "1.0.2", &[]));
        // No expectation for "six": resolving it would panic the mock.

        let mut server = BTreeMap::new();
        server.insert("six".to_string(), "1.16.0".to_string());

        let resolver = DependencyResolver::new(&index);
        let plan = resolver
            .plan_install("latex", None, &server)
            .await
            .unwrap();

        let names: Vec<&str> = plan.iter().map(|p| p.info.name.as_str()).collect();
        assert_eq!(names, vec!["funcsigs", "latex"]);
    }

    #[tokio::test]
    async fn test_plan_install_resolves_requested_version() {
        let mut index = MockPackageIndex::new();
        expect_release(&mut index, release("simplejson", "3.0.3", &[]));

        let resolver = DependencyResolver::new(&index);
        let plan = resolver
            .plan_install("simplejson", Some("3.0.3"), &BTreeMap::new())
            .await
            .unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].info.version, "3.0.3");
        assert!(plan[0].target);
    }

    #[tokio::test]
    async fn test_plan_install_honors_dependency_pins() {
        let mut index = MockPackageIndex::new();
        expect_latest(&mut index, release("cryptography", "2.8", &["cffi (==1.12.3)"]));
        expect_release(&mut index, release("cffi", "1.12.3", &[]));

        let resolver = DependencyResolver::new(&index);
        let plan = resolver
            .plan_install("cryptography", None, &BTreeMap::new())
            .await
            .unwrap();

        let names: Vec<&str> = plan.iter().map(|p| p.info.name.as_str()).collect();
        assert_eq!(names, vec!["cffi", "cryptography"]);
        assert_eq!(plan[0].info.version, "1.12.3");
    }

    #[tokio::test]
    async fn test_plan_install_cycle_terminates() {
        let mut index = MockPackageIndex::new();
        expect_latest(&mut index, release("a", "1.0", &["b"]));
        expect_latest(&mut index, release("b", "1.0", &["a"]));

        let resolver = DependencyResolver::new(&index);
        let plan = resolver
            .plan_install("a", None, &BTreeMap::new())
            .await
            .unwrap();

        assert_eq!(plan.len(), 2);
        assert!(plan.iter().any(|p| p.target));
    }

    #[tokio::test]
    async fn test_plan_install_normalizes_target_name() {
        let mut index = MockPackageIndex::new();
        expect_latest(&mut index, release("theano", "1.0.5", &[]));

        let resolver = DependencyResolver::new(&index);
        let plan = resolver
            .plan_install("Theano", None, &BTreeMap::new())
            .await
            .unwrap();

        assert_eq!(plan[0].info.name, "theano");
        assert!(plan[0].target);
    }

    #[tokio::test]
    async fn test_plan_uninstall_drops_exclusive_dependency() {
        let mut index = MockPackageIndex::new();
        expect_release(&mut index, release("latex", "0.7.0", &["funcsigs"]));
        expect_release(&mut index, release("funcsigs", "1.0.2", &[]));

        let mut server = BTreeMap::new();
        server.insert("latex".to_string(), "0.7.0".to_string());
        server.insert("funcsigs".to_string(), "1.0.2".to_string());

        let resolver = DependencyResolver::new(&index);
        let drops = resolver
            .plan_uninstall(
                "latex",
                &server,
                &["latex".to_string(), "funcsigs".to_string()],
            )
            .await
            .unwrap();

        // Dependent first, then its exclusively-owned dependency
        assert_eq!(drops, vec!["latex".to_string(), "funcsigs".to_string()]);
    }

    #[tokio::test]
    async fn test_plan_uninstall_keeps_shared_dependency() {
        let mut index = MockPackageIndex::new();
        expect_release(&mut index, release("a", "1.0", &["c"]));
        expect_release(&mut index, release("b", "1.0", &["c"]));
        expect_release(&mut index, release("c", "1.0", &[]));

        let mut server = BTreeMap::new();
        server.insert("a".to_string(), "1.0".to_string());
        server.insert("b".to_string(), "1.0".to_string());
        server.insert("c".to_string(), "1.0".to_string());

        let resolver = DependencyResolver::new(&index);
        let drops = resolver
            .plan_uninstall(
                "a",
                &server,
                &["a".to_string(), "b".to_string(), "c".to_string()],
            )
            .await
            .unwrap();

        // c is still needed by b, so only a goes
        assert_eq!(drops, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_plan_uninstall_keeps_deps_on_metadata_failure() {
        let mut index = MockPackageIndex::new();
        index
            .expect_release()
            .with(eq("a"), eq("1.0"))
            .returning(|_, _| Err(anyhow::anyhow!("index unavailable")));
        expect_release(&mut index, release("b", "1.0", &[]));

        let mut server = BTreeMap::new();
        server.insert("a".to_string(), "1.0".to_string());
        server.insert("b".to_string(), "1.0".to_string());

        let resolver = DependencyResolver::new(&index);
        let drops = resolver
            .plan_uninstall("a", &server, &["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        // a's requirements are unknown, so only a itself is dropped
        assert_eq!(drops, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_plan_uninstall_chain_order() {
        let mut index = MockPackageIndex::new();
        expect_release(&mut index, release("a", "1.0", &["b"]));
        expect_release(&mut index, release("b", "1.0", &["c"]));
        expect_release(&mut index, release("c", "1.0", &[]));

        let mut server = BTreeMap::new();
        for (name, version) in [("a", "1.0"), ("b", "1.0"), ("c", "1.0")] {
            server.insert(name.to_string(), version.to_string());
        }

        let resolver = DependencyResolver::new(&index);
        let drops = resolver
            .plan_uninstall(
                "a",
                &server,
                &["a".to_string(), "b".to_string(), "c".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(
            drops,
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }
}

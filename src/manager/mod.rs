//! Package management against a SQL-hosted Python runtime.
//!
//! [`SqlPackageManager`] ties the pieces together: it resolves releases and
//! dependencies through a [`PackageIndex`], ships distribution files to the
//! server as external libraries, and inspects the runtime through
//! [`SqlPythonExecutor`].

pub mod dependencies;
pub mod library;

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use log::{info, warn};

use crate::executor::SqlPythonExecutor;
use crate::index::{PackageIndex, normalize_name};
use crate::scope::Scope;
use crate::sql::SqlClient;
use dependencies::DependencyResolver;

/// How to install a package.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Exact version to install; latest when unset.
    pub version: Option<String>,
    /// Replace the package when it is already installed.
    pub upgrade: bool,
    pub scope: Scope,
}

/// A library row on the server, joined with the version the runtime reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    pub name: String,
    /// None when the tracked library is not importable yet.
    pub version: Option<String>,
    pub scope: Scope,
}

/// What an install request ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The package and any missing dependencies were created.
    Installed { packages: Vec<InstalledPackage> },
    /// The package was replaced in place.
    Upgraded {
        package: String,
        from: String,
        to: String,
    },
    /// The package was already there and upgrade was not requested, or the
    /// requested version is the one installed. Nothing changed.
    AlreadyInstalled { package: String, version: String },
}

pub struct SqlPackageManager<'a, C: SqlClient> {
    client: &'a C,
    index: &'a dyn PackageIndex,
    executor: SqlPythonExecutor<'a, C>,
}

impl<'a, C: SqlClient> SqlPackageManager<'a, C> {
    pub fn new(client: &'a C, index: &'a dyn PackageIndex) -> Self {
        Self {
            client,
            index,
            executor: SqlPythonExecutor::new(client),
        }
    }

    pub fn executor(&self) -> &SqlPythonExecutor<'a, C> {
        &self.executor
    }

    /// Install `name` and whatever parts of its dependency closure the
    /// server is missing.
    pub async fn install(&self, name: &str, options: &InstallOptions) -> Result<InstallOutcome> {
        let target = normalize_name(name);
        let server = self.executor.server_packages().await?;

        if let Some(installed) = server.get(&target) {
            if !options.upgrade {
                warn!(
                    "Package {} {} exists on server. Set upgrade to replace it; no changes were made.",
                    target, installed
                );
                return Ok(InstallOutcome::AlreadyInstalled {
                    package: target,
                    version: installed.clone(),
                });
            }
            if options.version.as_deref() == Some(installed.as_str()) {
                info!("Package {} {} is already installed.", target, installed);
                return Ok(InstallOutcome::AlreadyInstalled {
                    package: target,
                    version: installed.clone(),
                });
            }
            return self
                .upgrade_in_place(&target, installed, options, &server)
                .await;
        }

        let resolver = DependencyResolver::new(self.index);
        let plan = resolver
            .plan_install(&target, options.version.as_deref(), &server)
            .await?;

        let mut packages = Vec::with_capacity(plan.len());
        for planned in &plan {
            let content = self.fetch_content(&planned.info).await?;
            info!(
                "Installing {} {} ({} scope)...",
                planned.info.name, planned.info.version, options.scope
            );
            self.client
                .execute(&library::create_library(
                    &planned.info.name,
                    &content,
                    options.scope,
                ))
                .await
                .with_context(|| format!("Failed to create library {}", planned.info.name))?;
            packages.push(InstalledPackage {
                name: planned.info.name.clone(),
                version: Some(planned.info.version.clone()),
                scope: options.scope,
            });
        }

        self.executor.materialize_libraries().await?;
        Ok(InstallOutcome::Installed { packages })
    }

    /// Replace an installed package with the requested (or latest) version,
    /// creating any dependencies the new release needs.
    async fn upgrade_in_place(
        &self,
        target: &str,
        installed: &str,
        options: &InstallOptions,
        server: &BTreeMap<String, String>,
    ) -> Result<InstallOutcome> {
        let resolver = DependencyResolver::new(self.index);
        let plan = resolver
            .plan_install(target, options.version.as_deref(), server)
            .await?;

        let mut to = installed.to_string();
        for planned in &plan {
            let content = self.fetch_content(&planned.info).await?;
            if planned.target {
                info!(
                    "Upgrading {} {} -> {}...",
                    target, installed, planned.info.version
                );
                self.client
                    .execute(&library::alter_library(&planned.info.name, &content))
                    .await
                    .with_context(|| format!("Failed to replace library {}", planned.info.name))?;
                to = planned.info.version.clone();
            } else {
                self.client
                    .execute(&library::create_library(
                        &planned.info.name,
                        &content,
                        options.scope,
                    ))
                    .await
                    .with_context(|| format!("Failed to create library {}", planned.info.name))?;
            }
        }

        self.executor.materialize_libraries().await?;
        Ok(InstallOutcome::Upgraded {
            package: target.to_string(),
            from: installed.to_string(),
            to,
        })
    }

    /// Uninstall `name` from `scope`, along with every dependency no other
    /// library in that scope still needs. Returns the dropped names,
    /// dependents first.
    pub async fn uninstall(&self, name: &str, scope: Scope) -> Result<Vec<String>> {
        let target = normalize_name(name);
        let tracked: Vec<String> = self
            .tracked_libraries()
            .await?
            .into_iter()
            .filter(|(_, s)| *s == scope)
            .map(|(n, _)| n)
            .collect();

        if !tracked.iter().any(|n| *n == target) {
            bail!("Package {} is not installed in the {} scope", target, scope);
        }

        let server = self.executor.server_packages().await?;
        let resolver = DependencyResolver::new(self.index);
        let drops = resolver.plan_uninstall(&target, &server, &tracked).await?;

        for library_name in &drops {
            info!("Dropping library {}...", library_name);
            self.client
                .execute(&library::drop_library(library_name, scope))
                .await
                .with_context(|| format!("Failed to drop library {}", library_name))?;
        }
        Ok(drops)
    }

    /// Drop one library row without touching its dependencies. Cleanup path
    /// for callers that manage dependencies themselves.
    pub async fn drop_library(&self, name: &str, scope: Scope) -> Result<()> {
        self.client
            .execute(&library::drop_library(&normalize_name(name), scope))
            .await
            .with_context(|| format!("Failed to drop library {}", name))
            .map(|_| ())
    }

    /// Rows of the tracking table: normalized library name and scope.
    pub async fn tracked_libraries(&self) -> Result<Vec<(String, Scope)>> {
        let rows = self
            .client
            .query(&library::list_libraries())
            .await
            .context("Failed to query installed libraries")?;
        let mut libraries = Vec::with_capacity(rows.len());
        for row in rows {
            let name = row
                .first()
                .and_then(|c| c.as_deref())
                .context("Library row without a name")?;
            let scope = match row.get(1).and_then(|c| c.as_deref()) {
                Some("PUBLIC") => Scope::Public,
                _ => Scope::Private,
            };
            libraries.push((normalize_name(name), scope));
        }
        Ok(libraries)
    }

    /// Tracked libraries joined with the versions the runtime reports.
    pub async fn installed_packages(&self) -> Result<Vec<InstalledPackage>> {
        let tracked = self.tracked_libraries().await?;
        let server = self.executor.server_packages().await?;
        Ok(tracked
            .into_iter()
            .map(|(name, scope)| {
                let version = server.get(&name).cloned();
                InstalledPackage {
                    name,
                    version,
                    scope,
                }
            })
            .collect())
    }

    async fn fetch_content(&self, info: &crate::index::ReleaseInfo) -> Result<Vec<u8>> {
        let file = info.pick_file().with_context(|| {
            format!(
                "No installable distribution published for {} {}",
                info.name, info.version
            )
        })?;
        self.index
            .download(file)
            .await
            .with_context(|| format!("Failed to download {}", file.filename))
    }
}

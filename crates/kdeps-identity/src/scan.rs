use crate::catalog::Catalog;
use kdeps_core::{AgentInfo, CatalogEntry, ParsedRef, Version};
use kdeps_error::Error;
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

/// `RegisterAllAgentsAndActions`: a best-effort three-pass scan that
/// populates `catalog` from the on-disk layout. Per-subtree read/parse
/// errors are logged and skipped; only a genuine catalog write failure
/// propagates (per spec.md §4.1, DB failures on register are not
/// best-effort).
pub fn register_all_agents_and_actions(
    catalog: &Catalog,
    agents_root: &Path,
    project_root: &Path,
) -> Result<(), Error> {
    scan_kdeps_bundles(catalog, agents_root)?;
    scan_workflow_trees(catalog, agents_root)?;
    scan_project_declarations(catalog, project_root)?;
    Ok(())
}

/// Pass (i): `<agents_root>/<name>.kdeps` bundle files register as
/// `@<name>:1.0.0`.
fn scan_kdeps_bundles(catalog: &Catalog, agents_root: &Path) -> Result<(), Error> {
    let entries = match std::fs::read_dir(agents_root) {
        Ok(e) => e,
        Err(_) => return Ok(()),
    };
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry while scanning .kdeps bundles");
                continue;
            }
        };
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("kdeps") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let id = format!("@{name}:1.0.0");
        let descriptor = CatalogEntry {
            agent: name.to_string(),
            version: "1.0.0".to_string(),
            action: None,
            path: path.display().to_string(),
        };
        catalog.upsert_entry(&id, &descriptor)?;
    }
    Ok(())
}

/// Pass (ii): `<agents_root>/<name>/<version>/workflow.pkl` trees. Each
/// `ActionID = "..."` declaration registers one action row; the agent
/// itself is registered once per version found.
fn scan_workflow_trees(catalog: &Catalog, agents_root: &Path) -> Result<(), Error> {
    let name_entries = match std::fs::read_dir(agents_root) {
        Ok(e) => e,
        Err(_) => return Ok(()),
    };
    for name_entry in name_entries {
        let name_entry = match name_entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable agent directory");
                continue;
            }
        };
        let name_path = name_entry.path();
        if !name_path.is_dir() {
            continue;
        }
        let name = name_entry.file_name().to_string_lossy().into_owned();

        let version_entries = match std::fs::read_dir(&name_path) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, path = %name_path.display(), "skipping unreadable version directory");
                continue;
            }
        };
        for version_entry in version_entries {
            let version_entry = match version_entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable version entry");
                    continue;
                }
            };
            let version_path = version_entry.path();
            if !version_path.is_dir() {
                continue;
            }
            let version = version_entry.file_name().to_string_lossy().into_owned();
            let workflow_path = version_path.join("workflow.pkl");
            if !workflow_path.is_file() {
                continue;
            }
            let content = match std::fs::read_to_string(&workflow_path) {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, path = %workflow_path.display(), "skipping unreadable workflow.pkl");
                    continue;
                }
            };

            let agent_id = format!("@{name}:{version}");
            catalog.upsert_entry(
                &agent_id,
                &CatalogEntry {
                    agent: name.clone(),
                    version: version.clone(),
                    action: None,
                    path: workflow_path.display().to_string(),
                },
            )?;

            for line in content.lines() {
                if let Some(action) = parse_pkl_declaration(line, "ActionID") {
                    let action_id = format!("@{name}/{action}:{version}");
                    catalog.upsert_entry(
                        &action_id,
                        &CatalogEntry {
                            agent: name.clone(),
                            version: version.clone(),
                            action: Some(action),
                            path: workflow_path.display().to_string(),
                        },
                    )?;
                }
            }
        }
    }
    Ok(())
}

/// Pass (iii): project-local `resources/*.pkl` and `agents/*` declaration
/// files — `AgentID`/`Version`/`ActionID` lines and/or raw `@...` ids.
fn scan_project_declarations(catalog: &Catalog, project_root: &Path) -> Result<(), Error> {
    scan_declaration_dir(catalog, &project_root.join("resources"), Some("pkl"))?;
    scan_declaration_dir(catalog, &project_root.join("agents"), None)?;
    Ok(())
}

fn scan_declaration_dir(
    catalog: &Catalog,
    dir: &Path,
    ext_filter: Option<&str>,
) -> Result<(), Error> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry while scanning project declarations");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(ext) = ext_filter {
            if entry.path().extension().and_then(|e| e.to_str()) != Some(ext) {
                continue;
            }
        }
        let content = match std::fs::read_to_string(entry.path()) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, path = %entry.path().display(), "skipping unreadable declaration file");
                continue;
            }
        };
        register_declarations_in_file(catalog, &content, entry.path())?;
    }
    Ok(())
}

fn register_declarations_in_file(
    catalog: &Catalog,
    content: &str,
    path: &Path,
) -> Result<(), Error> {
    let mut agent: Option<String> = None;
    let mut version: Option<String> = None;
    let mut actions: Vec<String> = Vec::new();
    let mut raw_ids: Vec<String> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim().trim_matches(',').trim_matches('"');
        if trimmed.starts_with('@') {
            raw_ids.push(trimmed.to_string());
            continue;
        }
        if let Some(v) = parse_pkl_declaration(line, "AgentID") {
            agent = Some(v);
            continue;
        }
        if let Some(v) = parse_pkl_declaration(line, "Version") {
            version = Some(v);
            continue;
        }
        if let Some(v) = parse_pkl_declaration(line, "ActionID") {
            actions.push(v);
        }
    }

    for raw in &raw_ids {
        if let Ok(parsed) = ParsedRef::parse(raw) {
            if let Some(canonical) = parsed.canonical() {
                let descriptor = CatalogEntry {
                    agent: parsed.agent.clone().unwrap_or_default(),
                    version: parsed.version.map(|v| v.to_string()).unwrap_or_default(),
                    action: parsed.action.clone(),
                    path: path.display().to_string(),
                };
                catalog.upsert_entry(&canonical, &descriptor)?;
            }
        }
    }

    let (Some(agent), Some(version)) = (agent, version) else {
        return Ok(());
    };
    if actions.is_empty() {
        let id = format!("@{agent}:{version}");
        catalog.upsert_entry(
            &id,
            &CatalogEntry {
                agent,
                version,
                action: None,
                path: path.display().to_string(),
            },
        )?;
    } else {
        for action in actions {
            let id = format!("@{agent}/{action}:{version}");
            catalog.upsert_entry(
                &id,
                &CatalogEntry {
                    agent: agent.clone(),
                    version: version.clone(),
                    action: Some(action),
                    path: path.display().to_string(),
                },
            )?;
        }
    }
    Ok(())
}

/// Parse a `key = "value"` declaration line, trimmed and dequoted.
fn parse_pkl_declaration(line: &str, key: &str) -> Option<String> {
    let rest = line.trim().strip_prefix(key)?;
    let rest = rest.trim_start().strip_prefix('=')?;
    let rest = rest.trim();
    let rest = rest.strip_prefix('"')?;
    let rest = rest.strip_suffix('"')?;
    Some(rest.to_string())
}

/// `list-installed`: walk `<kdeps_dir>/agents/<name>/<version>/workflow.pkl`
/// and emit one [`AgentInfo`] per version found. A subtree missing
/// `workflow.pkl` is skipped, not reported.
#[must_use]
pub fn list_installed(agents_root: &Path) -> Vec<AgentInfo> {
    let mut out = Vec::new();
    let name_entries = match std::fs::read_dir(agents_root) {
        Ok(e) => e,
        Err(_) => return out,
    };
    for name_entry in name_entries.flatten() {
        let name_path = name_entry.path();
        if !name_path.is_dir() {
            continue;
        }
        let name = name_entry.file_name().to_string_lossy().into_owned();
        let Ok(version_entries) = std::fs::read_dir(&name_path) else {
            continue;
        };
        for version_entry in version_entries.flatten() {
            let version_path = version_entry.path();
            if !version_path.is_dir() {
                continue;
            }
            if !version_path.join("workflow.pkl").is_file() {
                continue;
            }
            let version_str = version_entry.file_name().to_string_lossy().into_owned();
            let Ok(version) = version_str.parse::<Version>() else {
                continue;
            };
            out.push(AgentInfo::new(format!("@{name}:{version}"), version, ""));
        }
    }
    out
}

use std::io::Write;

use serde_json::json;

use crate::update::registry::UpdateRegistry;

pub async fn check<W: Write>(registry: &UpdateRegistry, json: bool, out: &mut W) -> anyhow::Result<()> {
    let offers = registry.offers().await?;

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&offers)?)?;
        return Ok(());
    }

    if offers.is_empty() {
        writeln!(out, "All plugins are up to date")?;
        return Ok(());
    }

    for offer in &offers {
        writeln!(
            out,
            "{}: {} -> {} ({})",
            offer.identifier, offer.installed_version, offer.new_version, offer.url
        )?;
    }
    Ok(())
}

pub async fn info<W: Write>(
    registry: &UpdateRegistry,
    slug: &str,
    json: bool,
    out: &mut W,
) -> anyhow::Result<()> {
    let record = registry.describe(slug).await?;

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&record)?)?;
        return Ok(());
    }

    let Some(record) = record else {
        writeln!(out, "No release information for {}", slug)?;
        return Ok(());
    };

    writeln!(out, "{} {}", slug, record.remote_version)?;
    writeln!(out, "  homepage: {}", record.homepage)?;
    writeln!(out, "  package:  {}", record.download_url)?;
    let optional = [
        ("author", &record.author),
        ("requires", &record.requires),
        ("tested", &record.tested),
        ("updated", &record.last_updated),
    ];
    for (label, value) in optional {
        if let Some(value) = value {
            writeln!(out, "  {label}:{:pad$}{value}", "", pad = 9 - label.len())?;
        }
    }
    if let Some(description) = &record.description {
        writeln!(out, "\n{}", description)?;
    }
    Ok(())
}

pub async fn update<W: Write>(
    registry: &UpdateRegistry,
    slug: &str,
    json: bool,
    out: &mut W,
) -> anyhow::Result<()> {
    let report = registry.apply_update(slug).await?;
    let warning = report.warning.as_ref().map(ToString::to_string);

    if json {
        let value = json!({
            "identifier": report.identifier,
            "newVersion": report.new_version,
            "destination": report.destination,
            "warning": warning,
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
        return Ok(());
    }

    writeln!(out, "Updated {} to {}", report.identifier, report.new_version)?;
    if let Some(warning) = warning {
        writeln!(out, "Warning: {}", warning)?;
    }
    Ok(())
}

pub fn clear_cache<W: Write>(registry: &UpdateRegistry, json: bool, out: &mut W) -> anyhow::Result<()> {
    registry.clear_cache()?;

    if json {
        writeln!(out, "{}", json!({ "cleared": true }))?;
    } else {
        writeln!(out, "Cache cleared")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::directory::MockPluginSource;
    use crate::plugin::types::PluginDescriptor;
    use crate::update::cache::UpdateCache;
    use crate::update::clock::SystemClock;
    use crate::update::installer::MockInstaller;
    use crate::update::reference::HostKind;
    use crate::update::source::{MockRepositorySource, RepositorySource, SourceSet};
    use crate::update::store::MemoryStore;
    use crate::update::types::UpdateRecord;
    use std::sync::Arc;
    use std::time::Duration;

    fn registry(remote_version: &'static str) -> UpdateRegistry {
        let mut plugins = MockPluginSource::new();
        plugins.expect_installed_plugins().returning(|| {
            Ok(vec![PluginDescriptor::new(
                "hello",
                "1.2.0",
                Some("https://github.com/acme/hello"),
            )])
        });

        let mut source = MockRepositorySource::new();
        source.expect_host_kind().return_const(HostKind::GitHub);
        source
            .expect_recognizes()
            .returning(|r| r.host_kind == HostKind::GitHub);
        source.expect_fetch_latest().returning(move |_| {
            let mut record = UpdateRecord::new(
                remote_version,
                "https://github.com/acme/hello/archive/refs/tags/1.3.0.zip",
                "https://github.com/acme/hello",
            );
            record.author = Some("Acme".to_string());
            Ok(record)
        });

        let source: Arc<dyn RepositorySource> = Arc::new(source);
        let clock = Arc::new(SystemClock);
        let cache = UpdateCache::new(
            Arc::new(MemoryStore::new(clock.clone())),
            clock,
            SourceSet::new(vec![source]),
        );
        UpdateRegistry::new(
            Arc::new(plugins),
            cache,
            Arc::new(MockInstaller::new()),
            "/srv/plugins",
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn check_prints_one_line_per_update() {
        let mut out = Vec::new();
        check(&registry("1.3.0"), false, &mut out).await.unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "hello: 1.2.0 -> 1.3.0 (https://github.com/acme/hello)\n"
        );
    }

    #[tokio::test]
    async fn check_reports_up_to_date() {
        let mut out = Vec::new();
        check(&registry("1.2.0"), false, &mut out).await.unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "All plugins are up to date\n");
    }

    #[tokio::test]
    async fn check_json_uses_camel_case_fields() {
        let mut out = Vec::new();
        check(&registry("1.3.0"), true, &mut out).await.unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value[0]["identifier"], "hello");
        assert_eq!(value[0]["newVersion"], "1.3.0");
        assert_eq!(value[0]["installedVersion"], "1.2.0");
    }

    #[tokio::test]
    async fn info_prints_known_optional_fields() {
        let mut out = Vec::new();
        info(&registry("1.3.0"), "hello", false, &mut out)
            .await
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("hello 1.3.0\n"));
        assert!(text.contains("  author:   Acme\n"));
        assert!(!text.contains("requires"));
    }

    #[tokio::test]
    async fn info_json_uses_camel_case_fields() {
        let mut out = Vec::new();
        info(&registry("1.3.0"), "hello", true, &mut out)
            .await
            .unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["remoteVersion"], "1.3.0");
        assert_eq!(
            value["downloadUrl"],
            "https://github.com/acme/hello/archive/refs/tags/1.3.0.zip"
        );
        assert_eq!(value["lastUpdated"], serde_json::Value::Null);
        assert!(value.get("remote_version").is_none());
    }

    #[tokio::test]
    async fn info_json_prints_null_for_unknown_plugin() {
        let mut out = Vec::new();
        info(&registry("1.3.0"), "missing", true, &mut out)
            .await
            .unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "null\n");
    }
}

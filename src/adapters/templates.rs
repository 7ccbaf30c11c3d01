use crate::domain::model::Template;
use crate::domain::ports::TemplateSource;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

pub const TEMPLATE_EXTENSION: &str = "j2";

/// Reads `<root>/<service>/*.j2`, sorted by file name.
#[derive(Debug, Clone)]
pub struct FsTemplateSource {
    root: PathBuf,
}

impl FsTemplateSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn service_dir(&self, service: &str) -> PathBuf {
        self.root.join(service)
    }
}

#[async_trait]
impl TemplateSource for FsTemplateSource {
    async fn load_templates(&self, service: &str) -> Result<Option<Vec<Template>>> {
        let dir = self.service_dir(service);
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(None);
        }

        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_template = path.extension().is_some_and(|e| e == TEMPLATE_EXTENSION);
            if is_template && entry.file_type().await?.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut templates = Vec::with_capacity(paths.len());
        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let source = tokio::fs::read_to_string(&path).await?;
            templates.push(Template::new(service, name, source));
        }
        Ok(Some(templates))
    }

    fn location(&self, service: &str) -> String {
        self.service_dir(service).display().to_string()
    }
}

/// Templates held in memory, keyed by service.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTemplateSource {
    templates: HashMap<String, Vec<Template>>,
}

impl InMemoryTemplateSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a template; the service then counts as having a template set.
    pub fn with_template(mut self, service: &str, name: &str, source: &str) -> Self {
        self.templates
            .entry(service.to_string())
            .or_default()
            .push(Template::new(service, name, source));
        self
    }

    /// Registers a service with an empty template set.
    pub fn with_service(mut self, service: &str) -> Self {
        self.templates.entry(service.to_string()).or_default();
        self
    }
}

#[async_trait]
impl TemplateSource for InMemoryTemplateSource {
    async fn load_templates(&self, service: &str) -> Result<Option<Vec<Template>>> {
        Ok(self.templates.get(service).cloned())
    }

    fn location(&self, service: &str) -> String {
        format!("memory:{}", service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_loads_only_j2_files_in_name_order() {
        let dir = TempDir::new().unwrap();
        let web = dir.path().join("web");
        std::fs::create_dir_all(web.join("nested")).unwrap();
        std::fs::write(web.join("z.conf.j2"), "{{ b }}").unwrap();
        std::fs::write(web.join("a.conf.j2"), "{{ a }}").unwrap();
        std::fs::write(web.join("README.md"), "notes").unwrap();

        let source = FsTemplateSource::new(dir.path());
        let templates = source.load_templates("web").await.unwrap().unwrap();
        let names: Vec<&str> = templates.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a.conf.j2", "z.conf.j2"]);
        assert_eq!(templates[0].service, "web");
        assert_eq!(templates[0].source, "{{ a }}");
    }

    #[tokio::test]
    async fn test_missing_directory_is_none() {
        let dir = TempDir::new().unwrap();
        let source = FsTemplateSource::new(dir.path());
        assert!(source.load_templates("ghost").await.unwrap().is_none());
        assert!(source.location("ghost").ends_with("ghost"));
    }

    #[tokio::test]
    async fn test_in_memory_source() {
        let source = InMemoryTemplateSource::new()
            .with_template("web", "a.j2", "{{ x }}")
            .with_service("db");
        assert_eq!(source.load_templates("web").await.unwrap().unwrap().len(), 1);
        assert!(source.load_templates("db").await.unwrap().unwrap().is_empty());
        assert!(source.load_templates("cache").await.unwrap().is_none());
    }
}

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use thiserror::Error;

/// Token placeholders used by the workload templates.
pub mod tokens {
    pub const REGISTRY_NAME: &str = "REGISTRY_NAME";
    pub const IDENTITY_CLIENT_ID: &str = "IDENTITY_CLIENT_ID";
    pub const IDENTITY_RESOURCE_ID: &str = "IDENTITY_RESOURCE_ID";
    pub const DB_ENDPOINT: &str = "DB_ENDPOINT";
    pub const BACKEND_ADDRESS: &str = "BACKEND_ADDRESS";
    pub const IMAGE: &str = "IMAGE";
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("template {template}: no binding for token <{token}>")]
    UnresolvedToken { template: String, token: String },

    #[error("template {template}: binding {binding} matches no token")]
    UnusedBinding { template: String, binding: String },

    #[error("read template {path}: {err}")]
    ReadTemplate { err: std::io::Error, path: String },
}

/// A workload template: body text containing `<TOKEN>` placeholders.
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    body: String,
}

impl Template {
    pub fn new(name: &str, body: &str) -> Self {
        Self {
            name: name.to_string(),
            body: body.to_string(),
        }
    }

    pub fn from_file(name: &str, path: &str) -> Result<Self, Error> {
        let body = std::fs::read_to_string(path).map_err(|err| Error::ReadTemplate {
            err,
            path: path.to_string(),
        })?;
        Ok(Self::new(name, &body))
    }

    /// The set of placeholder tokens declared in the body.
    /// A token is an uppercase identifier between angle brackets.
    pub fn tokens(&self) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let bytes = self.body.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'<' {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len()
                    && (bytes[end].is_ascii_uppercase()
                        || bytes[end].is_ascii_digit()
                        || bytes[end] == b'_')
                {
                    end += 1;
                }
                if end > start && end < bytes.len() && bytes[end] == b'>' {
                    found.insert(self.body[start..end].to_string());
                    i = end + 1;
                    continue;
                }
            }
            i += 1;
        }
        found
    }
}

/// Token-to-value bindings for one render call.
#[derive(Debug, Clone, Default)]
pub struct Bindings(BTreeMap<String, String>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, token: &str, value: &str) -> Self {
        self.0.insert(token.to_string(), value.to_string());
        self
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.0.get(token).map(String::as_str)
    }
}

/// A concrete, deployable manifest. Immutable once rendered; a change in
/// bindings produces a new instance rather than patching this one.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub name: String,
    body: String,
}

impl Manifest {
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Logical workload name from the manifest's own metadata, when the
    /// body is a Kubernetes-style YAML document.
    pub fn metadata_name(&self) -> Option<String> {
        #[derive(serde::Deserialize)]
        struct Metadata {
            name: String,
        }
        #[derive(serde::Deserialize)]
        struct Doc {
            metadata: Metadata,
        }
        // Multi-document manifests name the workload in their first
        // document.
        let first = self.body.split("\n---").next().unwrap_or(&self.body);
        serde_yaml::from_str::<Doc>(first)
            .ok()
            .map(|doc| doc.metadata.name)
    }
}

/// Substitute every `<TOKEN>` in the template with its binding.
///
/// Substitution is plain text replacement; templates carry no expressions.
/// The binding set must match the template's token set exactly: a missing
/// binding fails with [`Error::UnresolvedToken`], a binding that matches no
/// token fails with [`Error::UnusedBinding`].
pub fn render(template: &Template, bindings: &Bindings) -> Result<Manifest, Error> {
    let wanted = template.tokens();

    for binding in bindings.0.keys() {
        if !wanted.contains(binding) {
            return Err(Error::UnusedBinding {
                template: template.name.clone(),
                binding: binding.clone(),
            });
        }
    }

    let mut body = template.body.clone();
    for token in &wanted {
        let Some(value) = bindings.get(token) else {
            return Err(Error::UnresolvedToken {
                template: template.name.clone(),
                token: token.clone(),
            });
        };
        body = body.replace(&format!("<{token}>"), value);
    }

    Ok(Manifest {
        name: template.name.clone(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACKEND: &str = "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: backend
spec:
  containers:
    - image: <REGISTRY_NAME>/backend:latest
      env:
        - name: COSMOS_DB_ENDPOINT
          value: <DB_ENDPOINT>
        - name: AZURE_CLIENT_ID
          value: <IDENTITY_CLIENT_ID>
";

    #[test]
    fn scans_all_tokens() {
        let t = Template::new("backend", BACKEND);
        let tokens: Vec<String> = t.tokens().into_iter().collect();
        assert_eq!(
            tokens,
            vec!["DB_ENDPOINT", "IDENTITY_CLIENT_ID", "REGISTRY_NAME"]
        );
    }

    #[test]
    fn complete_bindings_leave_no_tokens_behind() {
        let t = Template::new("backend", BACKEND);
        let bindings = Bindings::new()
            .set("REGISTRY_NAME", "evtmgmtacr.azurecr.io")
            .set("DB_ENDPOINT", "https://db.example/")
            .set("IDENTITY_CLIENT_ID", "11111111-2222-3333-4444-555555555555");
        let manifest = render(&t, &bindings).unwrap();
        assert!(Template::new("check", manifest.body()).tokens().is_empty());
        assert!(manifest.body().contains("https://db.example/"));
        assert_eq!(manifest.metadata_name().as_deref(), Some("backend"));
    }

    #[test]
    fn missing_binding_is_an_unresolved_token() {
        let t = Template::new("backend", BACKEND);
        let bindings = Bindings::new()
            .set("REGISTRY_NAME", "evtmgmtacr.azurecr.io")
            .set("DB_ENDPOINT", "https://db.example/");
        let err = render(&t, &bindings).unwrap_err();
        match err {
            Error::UnresolvedToken { token, .. } => assert_eq!(token, "IDENTITY_CLIENT_ID"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn extra_binding_is_rejected() {
        let t = Template::new("one", "value: <A>");
        let bindings = Bindings::new().set("A", "1").set("B", "2");
        assert!(matches!(
            render(&t, &bindings),
            Err(Error::UnusedBinding { .. })
        ));
    }

    #[test]
    fn rendering_twice_produces_independent_manifests() {
        let t = Template::new("frontend", "backend: <BACKEND_ADDRESS>");
        let first = render(&t, &Bindings::new().set("BACKEND_ADDRESS", "10.0.0.5")).unwrap();
        let second = render(&t, &Bindings::new().set("BACKEND_ADDRESS", "10.0.0.6")).unwrap();
        assert_eq!(first.body(), "backend: 10.0.0.5");
        assert_eq!(second.body(), "backend: 10.0.0.6");
    }

    #[test]
    fn angle_brackets_that_are_not_tokens_pass_through() {
        let t = Template::new("misc", "note: a < b and x <notatoken> y");
        let manifest = render(&t, &Bindings::new()).unwrap();
        assert!(manifest.body().contains("<notatoken>"));
    }
}

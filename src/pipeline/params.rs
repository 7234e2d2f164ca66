use crate::error::{Error, Result};
use crate::executor::{Parameters, Value};

/// One declared pipeline parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    /// Value used when the caller does not supply one
    pub default: Option<Value>,
}

impl ParamDecl {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            default: Some(default),
        }
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// The parameters a pipeline accepts, checked before any step runs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSchema {
    decls: Vec<ParamDecl>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a declaration. Names must be unique.
    pub fn declare(&mut self, decl: ParamDecl) -> Result<()> {
        if self.get(&decl.name).is_some() {
            return Err(Error::config(format!(
                "parameter '{}' declared more than once",
                decl.name
            )));
        }
        self.decls.push(decl);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ParamDecl> {
        self.decls.iter().find(|d| d.name == name)
    }

    pub fn decls(&self) -> &[ParamDecl] {
        &self.decls
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Match supplied values against the declarations
    ///
    /// Unknown names and missing required parameters are configuration
    /// errors; declared defaults fill in anything not supplied.
    pub fn resolve(&self, supplied: &Parameters) -> Result<Parameters> {
        let unknown: Vec<&str> = supplied
            .keys()
            .filter(|name| self.get(name).is_none())
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            let declared: Vec<&str> = self.decls.iter().map(|d| d.name.as_str()).collect();
            return Err(Error::config(format!(
                "unknown parameter(s) {:?}; declared parameters are {:?}",
                unknown, declared
            )));
        }

        let mut resolved = Parameters::new();
        for decl in &self.decls {
            let value = supplied
                .get(&decl.name)
                .or(decl.default.as_ref())
                .ok_or_else(|| {
                    Error::config(format!(
                        "parameter '{}' is required but was not supplied",
                        decl.name
                    ))
                })?;
            resolved.insert(decl.name.clone(), value.clone());
        }

        Ok(resolved)
    }
}

/// Parse `NAME=VALUE` pairs from the command line
pub fn parse_assignments<I, S>(pairs: I) -> Result<Parameters>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut params = Parameters::new();
    for pair in pairs {
        let pair = pair.as_ref();
        let (name, raw) = pair.split_once('=').ok_or_else(|| {
            Error::config(format!("invalid parameter '{}', expected NAME=VALUE", pair))
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::config(format!("invalid parameter '{}'", pair)));
        }
        params.insert(name.to_string(), Value::parse_param(raw));
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ParamSchema {
        let mut schema = ParamSchema::new();
        schema.declare(ParamDecl::required("alpha")).unwrap();
        schema
            .declare(ParamDecl::with_default("a", Value::Int(100)))
            .unwrap();
        schema
            .declare(ParamDecl::with_default("b", Value::Int(200)))
            .unwrap();
        schema
    }

    #[test]
    fn test_defaults_fill_in() {
        let supplied = parse_assignments(["alpha=100"]).unwrap();
        let resolved = schema().resolve(&supplied).unwrap();

        assert_eq!(resolved["alpha"], Value::Int(100));
        assert_eq!(resolved["a"], Value::Int(100));
        assert_eq!(resolved["b"], Value::Int(200));
    }

    #[test]
    fn test_supplied_overrides_default() {
        let supplied = parse_assignments(["alpha=1", "a=200"]).unwrap();
        let resolved = schema().resolve(&supplied).unwrap();
        assert_eq!(resolved["a"], Value::Int(200));
    }

    #[test]
    fn test_missing_required_is_config_error() {
        let err = schema().resolve(&Parameters::new()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("'alpha' is required"));
    }

    #[test]
    fn test_unknown_parameter_is_config_error() {
        let supplied = parse_assignments(["alpha=1", "gamma=3"]).unwrap();
        let err = schema().resolve(&supplied).unwrap_err();
        assert!(err.to_string().contains("gamma"));
    }

    #[test]
    fn test_duplicate_declaration() {
        let mut schema = schema();
        assert!(schema.declare(ParamDecl::required("a")).is_err());
    }

    #[test]
    fn test_parse_assignments() {
        let params = parse_assignments(["name=hello world", "ratio=0.5", "expr=a=b"]).unwrap();
        assert_eq!(params["name"], Value::Str("hello world".to_string()));
        assert_eq!(params["ratio"], Value::Float(0.5));
        assert_eq!(params["expr"], Value::Str("a=b".to_string()));

        assert!(parse_assignments(["novalue"]).is_err());
        assert!(parse_assignments(["=1"]).is_err());
    }
}

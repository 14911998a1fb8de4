//! Immutable runtime index from (method, path) to procedure

use crate::error::{ConfigurationError, GatewayResult};
use crate::mapping::{HttpMethod, PathTemplate};
use crate::openapi::check_descriptor;
use crate::procedure::ProcedureDescriptor;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// A routable procedure
#[derive(Debug, Clone)]
pub struct RouteEntry {
    /// Qualified procedure name
    pub name: String,
    pub descriptor: Arc<ProcedureDescriptor>,
    pub template: PathTemplate,
}

/// Result of a successful lookup
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub entry: &'a RouteEntry,
    /// Percent-decoded path parameter values
    pub params: IndexMap<String, String>,
}

/// Route table built once per gateway; read-only afterwards
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<HttpMethod, Vec<RouteEntry>>,
}

impl RouteTable {
    /// Build from qualified names and descriptors in registration order.
    ///
    /// Disabled procedures are left out.
    pub fn build<I>(procedures: I, coerce_input: bool) -> GatewayResult<Self>
    where
        I: IntoIterator<Item = (String, Arc<ProcedureDescriptor>)>,
    {
        let mut routes: HashMap<HttpMethod, Vec<RouteEntry>> = HashMap::new();

        for (name, descriptor) in procedures {
            if !descriptor.enabled {
                continue;
            }

            let checked = check_descriptor(&descriptor, coerce_input)
                .map_err(|e| e.in_procedure(descriptor.kind, &name))?;
            let entries = routes.entry(descriptor.method).or_default();

            let key = checked.template.route_key();
            if let Some(existing) = entries.iter().find(|e| e.template.route_key() == key) {
                return Err(ConfigurationError::DuplicateRoute {
                    method: descriptor.method,
                    path: checked.template.template().to_string(),
                    existing: existing.name.clone(),
                }
                .in_procedure(descriptor.kind, &name));
            }

            entries.push(RouteEntry {
                name,
                descriptor,
                template: checked.template,
            });
        }

        Ok(Self { routes })
    }

    /// Find the procedure for a request method and path.
    ///
    /// The candidate with the most literal segments wins; ties go to the
    /// earliest registration. Methods outside GET/POST/PUT/PATCH/DELETE
    /// never match.
    pub fn lookup(&self, method: &http::Method, path: &str) -> Option<RouteMatch<'_>> {
        let method = HttpMethod::from_http(method)?;
        let mut best: Option<RouteMatch<'_>> = None;

        for entry in self.routes.get(&method)? {
            let Some(params) = entry.template.match_path(path) else {
                continue;
            };
            let better = match &best {
                Some(current) => entry.template.literal_count() > current.entry.template.literal_count(),
                None => true,
            };
            if better {
                best = Some(RouteMatch { entry, params });
            }
        }

        best
    }

    /// Number of routes
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

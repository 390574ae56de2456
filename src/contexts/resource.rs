//! Resource context, for statements that only touch the resource itself.

use opentelemetry_proto::tonic::common::v1::InstrumentationScope;
use opentelemetry_proto::tonic::resource::v1::Resource;

use super::{
    get_resource_field, parse_resource_field, set_resource_field, unknown_path, ContextKind,
    FieldSpec, ResourceField, TelemetryContext,
};
use crate::ast::PathAst;
use crate::error::{BindError, ExecutionError};
use crate::value::Value;

pub struct ResourceContext<'a> {
    resource: &'a mut Option<Resource>,
}

impl<'a> ResourceContext<'a> {
    pub fn new(resource: &'a mut Option<Resource>) -> Self {
        Self { resource }
    }
}

impl TelemetryContext for ResourceContext<'_> {
    fn resource(&self) -> Option<&Resource> {
        self.resource.as_ref()
    }

    fn resource_mut(&mut self) -> &mut Resource {
        self.resource.get_or_insert_with(Resource::default)
    }

    fn scope(&self) -> Option<&InstrumentationScope> {
        None
    }

    fn scope_mut(&mut self) -> Option<&mut InstrumentationScope> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceKind;

impl ContextKind for ResourceKind {
    type Ctx<'a> = ResourceContext<'a>;
    type Field = ResourceField;

    const NAME: &'static str = "resource";

    fn parse_field(path: &PathAst) -> Result<FieldSpec<ResourceField>, BindError> {
        parse_resource_field(&path.name()).ok_or_else(|| unknown_path::<Self>(path))
    }

    fn get_field(ctx: &Self::Ctx<'_>, field: ResourceField) -> Result<Value, ExecutionError> {
        Ok(get_resource_field(ctx.resource(), field))
    }

    fn set_field(
        ctx: &mut Self::Ctx<'_>,
        field: ResourceField,
        value: Value,
    ) -> Result<(), ExecutionError> {
        set_resource_field(ctx.resource_mut(), field, value)
    }
}

/// Visits each resource slot with a fresh context.
pub fn for_each_resource<'r, I, F>(resources: I, mut callback: F)
where
    I: IntoIterator<Item = &'r mut Option<Resource>>,
    F: FnMut(ResourceContext<'_>),
{
    for resource in resources {
        callback(ResourceContext::new(resource));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_paths_are_unknown() {
        let err =
            ResourceKind::parse_field(&PathAst::new(["instrumentation_scope", "name"])).unwrap_err();
        assert!(matches!(err, BindError::UnknownPath { context: "resource", .. }));
    }

    #[test]
    fn test_missing_resource_reads_empty() {
        let mut slot = None;
        let ctx = ResourceContext::new(&mut slot);
        assert_eq!(
            ResourceKind::get_field(&ctx, ResourceField::DroppedAttributesCount).unwrap(),
            Value::Int(0)
        );
        assert!(ctx.scope().is_none());
    }
}

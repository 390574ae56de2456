//! Binding of statement ASTs against a registry.

use crate::ast::{ArgumentAst, ConditionAst, StatementAst};
use crate::contexts::ContextKind;
use crate::error::BindError;
use crate::value::Value;

use super::condition::Condition;
use super::functions::{Argument, ArgumentList, Parameter, ParameterKind, Registry};
use super::getter::{ExprFunc, FunctionGetter, Getter, ListGetter, Literal, Target};
use super::path::resolve_path;
use super::statement::Statement;

impl<K: ContextKind> Registry<K> {
    /// Binds one statement. The same AST always binds to an equivalent
    /// statement.
    pub fn bind_statement(&self, ast: &StatementAst) -> Result<Statement<K>, BindError> {
        let func = self.bind_call(&ast.function, &ast.arguments)?;
        let condition = ast
            .condition
            .as_ref()
            .map(|c| self.bind_condition(c))
            .transpose()?;
        Ok(Statement::new(func, condition, ast.to_string()))
    }

    pub fn bind_condition(&self, ast: &ConditionAst) -> Result<Condition<K>, BindError> {
        Ok(match ast {
            ConditionAst::Compare { left, op, right } => Condition::Compare {
                left: self.bind_getter(left)?,
                op: *op,
                right: self.bind_getter(right)?,
            },
            ConditionAst::And(items) => Condition::And(self.bind_conditions(items)?),
            ConditionAst::Or(items) => Condition::Or(self.bind_conditions(items)?),
            ConditionAst::Not(inner) => Condition::Not(Box::new(self.bind_condition(inner)?)),
            ConditionAst::Value(arg) => Condition::Value(self.bind_getter(arg)?),
        })
    }

    fn bind_conditions(&self, items: &[ConditionAst]) -> Result<Vec<Condition<K>>, BindError> {
        items.iter().map(|c| self.bind_condition(c)).collect()
    }

    /// Looks up `function`, checks arity and argument shapes, then hands the
    /// bound arguments to the function's own `compile`.
    pub fn bind_call(
        &self,
        function: &str,
        arguments: &[ArgumentAst],
    ) -> Result<Box<dyn ExprFunc<K>>, BindError> {
        let factory = self
            .get(function)
            .ok_or_else(|| BindError::UnknownFunction(function.to_string()))?;
        let parameters = factory.parameters();

        let required = parameters.iter().filter(|p| p.required).count();
        if arguments.len() < required || arguments.len() > parameters.len() {
            let expected = if required == parameters.len() {
                required.to_string()
            } else {
                format!("{required} to {}", parameters.len())
            };
            return Err(BindError::Arity {
                function: function.to_string(),
                expected,
                actual: arguments.len(),
            });
        }

        let mut list = ArgumentList::new(factory.identifier());
        for (parameter, argument) in parameters.iter().zip(arguments) {
            let bound = self.bind_argument(factory.identifier(), parameter, argument)?;
            list.insert(parameter.keyword, bound);
        }
        factory.compile(list)
    }

    fn bind_argument(
        &self,
        function: &str,
        parameter: &Parameter,
        argument: &ArgumentAst,
    ) -> Result<Argument<K>, BindError> {
        let mismatch = || {
            BindError::invalid_argument(
                function,
                parameter.keyword,
                format!(
                    "expected {}, got {}",
                    parameter.kind.describe(),
                    argument.describe()
                ),
            )
        };

        let bound = match (parameter.kind, argument) {
            (ParameterKind::Getter, arg) => Argument::Getter(self.bind_getter(arg)?),
            (ParameterKind::GetterList, ArgumentAst::List(items)) => Argument::GetterList(
                items
                    .iter()
                    .map(|item| self.bind_getter(item))
                    .collect::<Result<_, _>>()?,
            ),
            (ParameterKind::GetSetter, ArgumentAst::Path(path)) => {
                let accessor = resolve_path::<K>(path)?;
                accessor.require_writable()?;
                Argument::GetSetter(Box::new(accessor))
            }
            (ParameterKind::Target, ArgumentAst::Path(path)) => {
                Argument::Target(Target::Path(resolve_path::<K>(path)?))
            }
            (ParameterKind::Target, arg) => Argument::Target(Target::Value(self.bind_getter(arg)?)),
            (ParameterKind::Setter, ArgumentAst::Path(path)) => {
                let accessor = resolve_path::<K>(path)?;
                accessor.require_writable()?;
                Argument::Setter(Box::new(accessor))
            }
            (ParameterKind::String, ArgumentAst::String(s)) => Argument::String(s.clone()),
            (ParameterKind::Int, ArgumentAst::Int(i)) => Argument::Int(*i),
            (ParameterKind::Bool, ArgumentAst::Bool(b)) => Argument::Bool(*b),
            (ParameterKind::StringList, ArgumentAst::List(items)) => Argument::StringList(
                items
                    .iter()
                    .map(|item| match item {
                        ArgumentAst::String(s) => Ok(s.clone()),
                        _ => Err(mismatch()),
                    })
                    .collect::<Result<_, _>>()?,
            ),
            _ => return Err(mismatch()),
        };
        Ok(bound)
    }

    /// Binds any argument as a read-only value source.
    pub fn bind_getter(&self, argument: &ArgumentAst) -> Result<Box<dyn Getter<K>>, BindError> {
        Ok(match argument {
            ArgumentAst::Nil => Box::new(Literal(Value::Nil)),
            ArgumentAst::Bool(b) => Box::new(Literal(Value::Bool(*b))),
            ArgumentAst::Int(i) => Box::new(Literal(Value::Int(*i))),
            ArgumentAst::Double(d) => Box::new(Literal(Value::Double(*d))),
            ArgumentAst::String(s) => Box::new(Literal(Value::String(s.clone()))),
            ArgumentAst::List(items) => Box::new(ListGetter {
                items: items
                    .iter()
                    .map(|item| self.bind_getter(item))
                    .collect::<Result<_, _>>()?,
            }),
            ArgumentAst::Path(path) => Box::new(resolve_path::<K>(path)?),
            ArgumentAst::Call(call) => Box::new(FunctionGetter {
                func: self.bind_call(&call.function, &call.arguments)?,
            }),
        })
    }
}

use tracing::debug;

use super::{RewriteContext, SetupContext, Transform};
use crate::core::syntax::{ClassModifier, Declaration, Member, MethodBody};
use crate::error::Result;

/// Passes subtypes of the configured names (exceptions by default) through untouched
pub struct SkipExcluded {
    supertypes: Vec<String>,
}

impl SkipExcluded {
    pub fn new(supertypes: Vec<String>) -> Self {
        Self { supertypes }
    }
}

impl Transform for SkipExcluded {
    fn name(&self) -> &'static str {
        "skip_excluded"
    }

    fn transform(&self, decl: Declaration, ctx: &mut RewriteContext<'_>) -> Result<Declaration> {
        let name = decl.qualified_name();
        if ctx.graph.is_instance_of(&name, &self.supertypes) {
            debug!("{} is excluded from instrumentation", name);
            ctx.pass_through();
        }
        Ok(decl)
    }
}

/// Keeps public methods and public constants only
pub struct PublicAndConstFilter;

impl Transform for PublicAndConstFilter {
    fn name(&self) -> &'static str {
        "public_and_const_filter"
    }

    fn transform(&self, mut decl: Declaration, _ctx: &mut RewriteContext<'_>) -> Result<Declaration> {
        if decl.has_bodies() {
            decl.members.retain(|member| match member {
                Member::Method(method) => method.is_public(),
                Member::Constant(constant) => constant.is_public(),
                Member::TraitUse(_) | Member::Verbatim(_) => false,
            });
        }
        Ok(decl)
    }
}

/// Drops `final` from the declaration and its members
pub struct RemoveFinal;

impl Transform for RemoveFinal {
    fn name(&self) -> &'static str {
        "remove_final"
    }

    fn transform(&self, mut decl: Declaration, _ctx: &mut RewriteContext<'_>) -> Result<Declaration> {
        decl.modifiers.retain(|modifier| *modifier != ClassModifier::Final);
        for member in &mut decl.members {
            match member {
                Member::Method(method) => method.is_final = false,
                Member::Constant(constant) => constant.is_final = false,
                Member::TraitUse(_) | Member::Verbatim(_) => {}
            }
        }
        Ok(decl)
    }
}

/// Replaces concrete method bodies with a call into the recording runtime
pub struct StripBodies;

impl Transform for StripBodies {
    fn name(&self) -> &'static str {
        "strip_bodies"
    }

    fn transform(&self, mut decl: Declaration, ctx: &mut RewriteContext<'_>) -> Result<Declaration> {
        if !decl.has_bodies() {
            return Ok(decl);
        }

        let mut returns = Vec::new();
        for method in decl.methods() {
            let instrumented = if method.is_abstract || method.body.is_none() {
                None
            } else if method.forbids_return_type() {
                Some(false)
            } else {
                // unresolved types still hand back the recorded result
                let hint = ctx.resolve_return_type(&decl, method);
                Some(hint.map_or(true, |hint| !hint.is_no_value()))
            };
            returns.push(instrumented);
        }

        for (method, returns_value) in decl.methods_mut().zip(returns) {
            if let Some(returns_value) = returns_value {
                method.body = Some(MethodBody::Instrumented { returns_value });
            }
        }
        Ok(decl)
    }
}

/// Composes the recording trait into classes and traits
pub struct AddMockTools {
    runtime_namespace: String,
}

impl AddMockTools {
    pub fn new(runtime_namespace: &str) -> Self {
        Self {
            runtime_namespace: runtime_namespace.trim_matches('\\').to_string(),
        }
    }

    fn trait_name(&self) -> String {
        format!("\\{}\\Mocker\\MockTools", self.runtime_namespace)
    }
}

impl Transform for AddMockTools {
    fn name(&self) -> &'static str {
        "add_mock_tools"
    }

    fn before_process(&self, setup: &SetupContext<'_>) -> Result<()> {
        let written = setup.emitter.write_runtime_support(&self.runtime_namespace)?;
        debug!("Runtime support written to {:?}", written);
        Ok(())
    }

    fn transform(&self, mut decl: Declaration, _ctx: &mut RewriteContext<'_>) -> Result<Declaration> {
        let trait_name = self.trait_name();
        let present = decl
            .members
            .iter()
            .any(|member| matches!(member, Member::TraitUse(name) if *name == trait_name));
        if decl.has_bodies() && !present {
            decl.members.insert(0, Member::TraitUse(trait_name));
        }
        Ok(decl)
    }
}

/// Annotates methods that lack a return type with the resolved one
pub struct SetReturnTypes;

impl Transform for SetReturnTypes {
    fn name(&self) -> &'static str {
        "set_return_types"
    }

    fn transform(&self, mut decl: Declaration, ctx: &mut RewriteContext<'_>) -> Result<Declaration> {
        let mut rendered = Vec::new();
        for method in decl.methods() {
            // declared types are resolved too, so subtypes can inherit them
            let hint = ctx.resolve_return_type(&decl, method);
            let missing = method.return_type.is_none() && !method.forbids_return_type();
            rendered.push(hint.filter(|_| missing).map(|hint| hint.render(ctx.scope)));
        }

        for (method, return_type) in decl.methods_mut().zip(rendered) {
            if return_type.is_some() {
                method.return_type = return_type;
            }
        }
        Ok(decl)
    }
}

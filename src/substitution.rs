//! `$NAME` and `${NAME}` substitution.
//!
//! A reference is `$` followed by a run of ASCII letters, digits and underscores,
//! optionally wrapped in braces. Anything else after a `$` is left alone. What an
//! unset variable turns into is decided by [`UnsetPolicy`] and is the same for
//! every argument of a session.

use crate::config::UnsetPolicy;
use crate::env::Environment;
use crate::parser::{CommandDescriptor, CommandName, RedirectTarget};
use regex::{Captures, Regex};
use std::sync::LazyLock;

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z0-9_]+)\}|([A-Za-z0-9_]+))").expect("variable pattern is valid")
});

/// Substitutes every variable reference in `arg`.
pub fn substitute(arg: &str, env: &Environment, policy: UnsetPolicy) -> String {
    VARIABLE
        .replace_all(arg, |caps: &Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            match (env.get_var(name), policy) {
                (Some(value), _) => value.to_string(),
                (None, UnsetPolicy::Keep) => caps[0].to_string(),
                (None, UnsetPolicy::Empty) => String::new(),
            }
        })
        .into_owned()
}

/// Rewrites a descriptor in place with substituted arguments and redirection paths.
///
/// Arguments that were written fully in single quotes are kept as they are. For
/// an assignment only the value is substituted, never the key. The name of an
/// invocation follows its substituted `arguments[0]`.
pub fn substitute_descriptor(
    descriptor: &mut CommandDescriptor,
    env: &Environment,
    policy: UnsetPolicy,
) {
    if descriptor.is_assignment() {
        if let Some(value) = descriptor.arguments.get_mut(1) {
            *value = substitute(value, env, policy);
        }
        return;
    }

    for (index, arg) in descriptor.arguments.iter_mut().enumerate() {
        if descriptor.single_quoted.contains(&index) {
            continue;
        }
        *arg = substitute(arg, env, policy);
    }
    if let Some(name) = descriptor.arguments.first() {
        descriptor.name = CommandName::Invocation(name.clone());
    }

    let targets = [&mut descriptor.input_path, &mut descriptor.output_path];
    for target in targets.into_iter().flatten() {
        substitute_target(target, env, policy);
    }
}

fn substitute_target(target: &mut RedirectTarget, env: &Environment, policy: UnsetPolicy) {
    if !target.single_quoted {
        target.path = substitute(&target.path, env, policy);
    }
}

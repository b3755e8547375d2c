//! Rendering of member syntax and declaration headers back to source text

use crate::model::{MemberKind, MemberSyntax, Parameter};

/// Render documentation text as `///` lines
pub fn render_documentation(documentation: &str) -> Vec<String> {
    documentation
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with("///") {
                trimmed.to_string()
            } else if trimmed.is_empty() {
                "///".to_string()
            } else {
                format!("/// {trimmed}")
            }
        })
        .collect()
}

/// Wrap an attribute in brackets unless it already carries them
pub fn render_attribute(attribute: &str) -> String {
    let attribute = attribute.trim();
    if attribute.starts_with('[') {
        attribute.to_string()
    } else {
        format!("[{attribute}]")
    }
}

fn render_parameter(parameter: &Parameter) -> String {
    let mut text = String::new();
    for modifier in &parameter.modifiers {
        text.push_str(modifier);
        text.push(' ');
    }
    text.push_str(&parameter.ty);
    text.push(' ');
    text.push_str(&parameter.name);
    if let Some(default) = &parameter.default {
        text.push_str(" = ");
        text.push_str(default);
    }
    text
}

fn render_parameters(parameters: &[Parameter]) -> String {
    parameters
        .iter()
        .map(render_parameter)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Body text after a signature: a block, an expression body or `;`
fn render_body(body: Option<&str>) -> String {
    match body.map(str::trim) {
        None | Some("") | Some(";") => ";".to_string(),
        Some(expression) if expression.starts_with("=>") => {
            if expression.ends_with(';') {
                format!(" {expression}")
            } else {
                format!(" {expression};")
            }
        }
        Some(block) => format!(" {block}"),
    }
}

fn prefix(member: &MemberSyntax) -> String {
    member
        .modifiers
        .iter()
        .map(|modifier| format!("{modifier} "))
        .collect()
}

/// Render one member, attributes and documentation included
pub fn render_member(member: &MemberSyntax) -> String {
    let mut lines = Vec::new();
    if let Some(documentation) = &member.documentation {
        lines.extend(render_documentation(documentation));
    }
    lines.extend(member.attributes.iter().map(|attribute| render_attribute(attribute)));

    let modifiers = prefix(member);
    let ty = member.ty.as_deref().unwrap_or("void");
    let parameters = render_parameters(&member.parameters);
    let body = render_body(member.body.as_deref());

    let declaration = match member.kind {
        MemberKind::Field => {
            let declarators = member
                .declarators
                .iter()
                .map(|declarator| match &declarator.initializer {
                    Some(initializer) => format!("{} = {}", declarator.name, initializer),
                    None => declarator.name.clone(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("{modifiers}{ty} {declarators};")
        }
        MemberKind::Event => {
            let names = member
                .declarators
                .iter()
                .map(|declarator| declarator.name.as_str())
                .collect::<Vec<_>>();
            let names = if names.is_empty() {
                member.name.clone()
            } else {
                names.join(", ")
            };
            match member.body.as_deref() {
                Some(accessors) => format!("{modifiers}event {ty} {names} {}", accessors.trim()),
                None => format!("{modifiers}event {ty} {names};"),
            }
        }
        MemberKind::Property => {
            let mut text = format!("{modifiers}{ty} {}{}", member.name, body);
            if let Some(initializer) = &member.initializer {
                text.push_str(&format!(" = {initializer};"));
            }
            text
        }
        MemberKind::Method => {
            let type_parameters = if member.type_parameters.is_empty() {
                String::new()
            } else {
                format!("<{}>", member.type_parameters.join(", "))
            };
            let constraints: String = member
                .constraints
                .iter()
                .map(|clause| format!(" where {clause}"))
                .collect();
            format!(
                "{modifiers}{ty} {}{type_parameters}({parameters}){constraints}{body}",
                member.name
            )
        }
        MemberKind::Constructor => {
            let initializer = member
                .initializer
                .as_deref()
                .map(|initializer| format!(" : {initializer}"))
                .unwrap_or_default();
            format!("{modifiers}{}({parameters}){initializer}{body}", member.name)
        }
        MemberKind::Destructor => format!("~{}(){body}", member.name),
        MemberKind::Operator => {
            format!("{modifiers}{ty} operator {}({parameters}){body}", member.name)
        }
        MemberKind::Conversion => {
            format!("{modifiers}{} operator {ty}({parameters}){body}", member.name)
        }
        MemberKind::Verbatim => member.body.clone().unwrap_or_default(),
    };
    lines.push(declaration);
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VariableDeclarator;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_methods_with_generics_and_expression_bodies() {
        let member = MemberSyntax::method("T", "Pick")
            .modifier("public")
            .type_parameter("U")
            .constraint("U : T")
            .param("U", "value")
            .body("=> value");
        assert_eq!(
            render_member(&member),
            "public T Pick<U>(U value) where U : T => value;"
        );
    }

    #[test]
    fn renders_documentation_and_attributes() {
        let member = MemberSyntax::property("int", "Count")
            .modifier("public")
            .documented("<summary>Items.</summary>")
            .attribute("JsonIgnore");
        assert_eq!(
            render_member(&member),
            "/// <summary>Items.</summary>\n[JsonIgnore]\npublic int Count { get; set; }"
        );
    }

    #[test]
    fn renders_special_members() {
        let ctor = MemberSyntax::constructor("Money")
            .modifier("public")
            .param("decimal", "amount")
            .initializer("this(amount, \"EUR\")")
            .body("{ }");
        assert_eq!(
            render_member(&ctor),
            "public Money(decimal amount) : this(amount, \"EUR\") { }"
        );

        let conversion = MemberSyntax::conversion(true, "Money")
            .modifier("public")
            .modifier("static")
            .param("decimal", "amount")
            .body("=> new(amount)");
        assert_eq!(
            render_member(&conversion),
            "public static implicit operator Money(decimal amount) => new(amount);"
        );

        assert_eq!(
            render_member(&MemberSyntax::destructor("Money").body("{ Release(); }")),
            "~Money() { Release(); }"
        );
    }

    #[test]
    fn renders_fields_and_events() {
        let field = MemberSyntax::field("int", &[])
            .modifier("private")
            .declarator(VariableDeclarator::new("count").with_initializer("0"));
        assert_eq!(render_member(&field), "private int count = 0;");

        let event = MemberSyntax::event("EventHandler", &["Changed"]).modifier("public");
        assert_eq!(render_member(&event), "public event EventHandler Changed;");
    }
}

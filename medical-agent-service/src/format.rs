use pulldown_cmark::{Options, Parser, html};

use crate::schema::SymptomAnalysis;

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() { default } else { value }
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        "- N/A\n".to_string()
    } else {
        items
            .iter()
            .map(|item| format!("- {item}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Renders a symptom analysis as the Markdown shown to the patient.
pub fn symptom_analysis_markdown(data: &SymptomAnalysis) -> String {
    let mut md = format!(
        "**{}**\n\n",
        or_default(
            &data.disclaimer_and_urgency,
            "Disclaimer: No professional medical advice provided."
        )
    );

    md.push_str("## 1. What You Might Be Experiencing\n");
    md.push_str(or_default(&data.current_condition_analysis, "N/A"));
    md.push_str("\n\n");

    md.push_str("## 2. Possible Medical Problems\n");
    md.push_str(&bullet_list(&data.possible_medical_problems));
    md.push_str("\n\n");

    md.push_str("## 3. Immediate Actions to Take\n");
    md.push_str(&bullet_list(&data.immediate_actions));
    md.push_str("\n\n");

    md.push_str("## 4. Recommended Specialist\n");
    md.push_str(&format!(
        "**Specialist:** {}\n\n",
        or_default(&data.recommended_specialist, "General Practitioner (GP)")
    ));

    md.push_str("***\n");
    md.push_str(or_default(&data.final_statement, "N/A"));
    md
}

/// CommonMark to HTML, with tables and strikethrough enabled.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options);
    let mut output = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut output, parser);
    output
}

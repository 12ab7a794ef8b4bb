//! Builds the fixed system instruction and the enhanced user instruction for
//! website generation. Pure and deterministic.

use crate::types::{ChatContext, ContentBlock, GenerationRequest, UserMessage};

const SYSTEM_INSTRUCTION: &str = r#"
You are an expert web developer specializing in creating production-ready, content-rich websites. You will respond in EXACTLY three parts separated by specific markers:

PART 1 - ANALYSIS (between ===ANALYSIS_START=== and ===ANALYSIS_END===):
Provide a brief analysis of what the user needs, understanding their requirements, and what type of website would best serve their needs.

PART 2 - CODE (between ===CODE_START=== and ===CODE_END===):
Generate ONLY HTML, CSS AND JAVASCRIPT.

**CRITICAL CONTENT REQUIREMENTS:**
- Use ALL actual content, data, and information provided in the description
- If contact information is provided (phone, email, address), include it in the website
- If services, features, or products are listed, create dedicated sections for them
- If pricing or packages are mentioned, display them prominently
- If company/product names are given, use them throughout the site
- Replace ALL placeholder text with real content from the description
- Create multiple sections based on the content categories identified

**DESIGN REQUIREMENTS:**
- If you want to use ICONS, import Font Awesome or Lucide icons library first
- For images, use www.unsplash.com with relevant search terms based on the content
- Create a modern, professional UI using HTML, CSS and JAVASCRIPT
- You may use TailwindCSS (import via <script src="https://cdn.tailwindcss.com"></script> in head)
- Implement smooth animations, hover effects, and interactive elements
- Ensure responsive design for all screen sizes
- Use a cohesive color scheme that matches the content theme

**OUTPUT FORMAT:**
OUTPUT ONLY THE COMPLETE HTML CODE STARTING WITH <!DOCTYPE html> AND ENDING WITH </html>. NO ADDITIONAL TEXT.

PART 3 - SUMMARY (between ===SUMMARY_START=== and ===SUMMARY_END===):
Explain what you have created, key features implemented, design choices made, and how it meets the user's requirements.

**STRICT FORMAT REQUIREMENT:**
===ANALYSIS_START===
[Your analysis here]
===ANALYSIS_END===

===CODE_START===
[Complete HTML code here]
===CODE_END===

===SUMMARY_START===
[Your summary here]
===SUMMARY_END===
"#;

const QUALITY_DIRECTIVES: &str = r#"
3. **Professional Quality**:
   - Modern, clean design with professional typography
   - Smooth animations and micro-interactions
   - Fully responsive layout
   - SEO-friendly structure with proper headings
   - Fast-loading, optimized code

4. **Visual Excellence**:
   - Use appropriate color schemes
   - High-quality images from Unsplash
   - Professional icons
   - Consistent spacing and alignment

5. **Functionality**:
   - Working navigation
   - Interactive elements (buttons, forms, etc.)
   - Smooth scrolling
   - Mobile-friendly menu
"#;

const CONTENT_CATEGORIES: &str = r#"   - Company/Product names
   - Contact information (phone, email, address, social media)
   - Services, features, or product offerings
   - Pricing, packages, or plans
   - Testimonials or reviews
   - Any other specific data mentioned
"#;

/// Where the raw topic came from. Document descriptions get stricter
/// "extract everything" wording than free-form prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicSource {
    Prompt,
    DocumentDescription,
}

/// The two instructions sent to the generation model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn into_context(self) -> ChatContext {
        ChatContext {
            system_prompt: Some(self.system),
            messages: vec![UserMessage {
                content: vec![ContentBlock::text(self.user)],
            }],
        }
    }
}

/// The system instruction. Identical for every call.
pub fn system_instruction() -> &'static str {
    SYSTEM_INSTRUCTION
}

/// Wrap a raw topic with the mandatory-content directives.
pub fn enhanced_user_instruction(topic: &str, source: TopicSource) -> String {
    let (heading, use_content, structure, closing) = match source {
        TopicSource::Prompt => (
            "CREATE A WORLD-CLASS, CONTENT-RICH WEBSITE BASED ON THE FOLLOWING SPECIFICATION:",
            "1. **Use Real Content**: If the prompt contains specific information, use it:",
            "2. **Content Structure**: Create dedicated sections for each content category",
            "Use actual content when provided, never generic placeholders.",
        ),
        TopicSource::DocumentDescription => (
            "CREATE A WORLD-CLASS, CONTENT-RICH WEBSITE BASED ON THE FOLLOWING DETAILED SPECIFICATION:",
            "1. **Use Real Content**: Extract and use ALL actual content from the description above:",
            "2. **Content Structure**: Create dedicated sections for each content category identified in the description",
            "Use the actual content provided, never generic placeholders.",
        ),
    };

    format!(
        "\n{heading}\n\n{topic}\n\n**MANDATORY REQUIREMENTS:**\n\n{use_content}\n{CONTENT_CATEGORIES}\n{structure}\n{QUALITY_DIRECTIVES}\n\
         **IMPORTANT**: This website should be production-ready and indistinguishable from those created by professional development teams. {closing}\n\n\
         Remember to follow the three-part response format with proper markers for analysis, code, and summary.\n"
    )
}

/// Block appended when the caller asks to refine a previously generated page.
fn refinement_block(previous_prompt: &str, previous_html: &str) -> String {
    format!(
        "\n**EXISTING WEBSITE TO REFINE:**\n\
         The previous request was:\n{previous_prompt}\n\n\
         The current website code is below. Apply the specification above as changes to it, \
         keep everything the new request does not mention, and return the complete updated page.\n\
         ```html\n{previous_html}\n```\n"
    )
}

/// Build both instructions for a generation request.
pub fn build(request: &GenerationRequest) -> Prompt {
    let source = if request.source_document_description.is_some() {
        TopicSource::DocumentDescription
    } else {
        TopicSource::Prompt
    };
    let mut user = enhanced_user_instruction(request.topic().trim(), source);

    let previous_html = request.previous_html.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let previous_prompt = request.previous_prompt.as_deref().map(str::trim).filter(|s| !s.is_empty());
    if let (Some(html), Some(prev)) = (previous_html, previous_prompt) {
        user.push_str(&refinement_block(prev, html));
    }

    Prompt {
        system: SYSTEM_INSTRUCTION.to_string(),
        user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol;

    #[test]
    fn system_instruction_names_every_marker() {
        for marker in [
            protocol::ANALYSIS_START,
            protocol::ANALYSIS_END,
            protocol::CODE_START,
            protocol::CODE_END,
            protocol::SUMMARY_START,
            protocol::SUMMARY_END,
        ] {
            assert!(system_instruction().contains(marker), "missing {marker}");
        }
    }

    #[test]
    fn build_is_deterministic_and_embeds_topic_verbatim() {
        let req = GenerationRequest::from_prompt("bakery website with phone 555-1234");
        let a = build(&req);
        let b = build(&req);
        assert_eq!(a, b);
        assert!(a.user.contains("bakery website with phone 555-1234"));
        assert!(a.user.contains("MANDATORY REQUIREMENTS"));
        assert_eq!(a.system, system_instruction());
    }

    #[test]
    fn document_descriptions_use_detailed_wording() {
        let p = build(&GenerationRequest::from_description("Acme Plumbing, call 555-0100"));
        assert!(p.user.contains("DETAILED SPECIFICATION"));
        assert!(p.user.contains("Extract and use ALL actual content"));
        assert!(p.user.contains("Acme Plumbing, call 555-0100"));
    }

    #[test]
    fn refinement_needs_both_previous_fields() {
        let mut req = GenerationRequest::from_prompt("make the header blue");
        req.previous_html = Some("<html><h1>Hi</h1></html>".into());
        let without = build(&req);
        assert!(!without.user.contains("EXISTING WEBSITE TO REFINE"));

        req.previous_prompt = Some("a greeting page".into());
        let with = build(&req);
        assert!(with.user.contains("EXISTING WEBSITE TO REFINE"));
        assert!(with.user.contains("<html><h1>Hi</h1></html>"));
        assert!(with.user.contains("a greeting page"));
    }

    #[test]
    fn into_context_has_system_and_one_user_turn() {
        let ctx = build(&GenerationRequest::from_prompt("x")).into_context();
        assert!(ctx.system_prompt.is_some());
        assert_eq!(ctx.messages.len(), 1);
    }
}

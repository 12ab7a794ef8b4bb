use futures::StreamExt;
use sitegen::protocol::Section;
use sitegen::relay::fragment_text;
use sitegen::{
    GenerationRequest, OpenAiCompatibleProvider, ProviderRegistry, SectionParser, Settings,
    StreamFragment, StreamingGenerator,
};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Run one generation locally, echoing the stream to stdout and optionally
/// saving the code section.
pub async fn run_generate(settings: Settings, prompt: &str, out: Option<&Path>) -> anyhow::Result<()> {
    let provider = Arc::new(OpenAiCompatibleProvider::from_settings(&settings));
    let generator = StreamingGenerator::new(ProviderRegistry::new(Arc::new(settings)), provider);

    let generation = generator
        .generate(&GenerationRequest::from_prompt(prompt))
        .await?;
    eprintln!(
        "Generating with {} ({}){}",
        generation.provider.name,
        generation.provider.model_id,
        if generation.used_fallback { " [fallback]" } else { "" }
    );

    let mut parser = SectionParser::new();
    let mut phase = parser.phase();
    let mut interrupted = None;
    let mut stdout = std::io::stdout();
    let mut fragments = generation.fragments;

    while let Some(fragment) = fragments.next().await {
        let text = fragment_text(&fragment);
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;
        if let StreamFragment::Interrupted(reason) = &fragment {
            interrupted = Some(reason.clone());
            break;
        }
        let next = parser.push(&text);
        if next != phase {
            tracing::debug!(?next, "response moved to a new section");
            phase = next;
        }
    }
    println!();

    if let Some(reason) = interrupted {
        anyhow::bail!("generation interrupted: {}", reason);
    }

    let sections = parser.complete();
    if sections.code.is_none() {
        eprintln!("warning: response did not contain a complete code section");
    }
    if let Some(path) = out {
        // An unterminated code section is still worth saving.
        let partial_code = || match parser.phase() {
            Section::Code => parser.partial().map(String::from),
            _ => None,
        };
        let code = sections
            .code
            .or_else(partial_code)
            .ok_or_else(|| anyhow::anyhow!("no code section to write"))?;
        std::fs::write(path, code)?;
        eprintln!("Wrote {}", path.display());
    }

    Ok(())
}

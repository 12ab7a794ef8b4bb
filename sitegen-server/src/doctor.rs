use sitegen::{
    Capability, ChatContext, ContentBlock, OpenAiCompatibleProvider, Provider, ProviderConfig,
    ProviderRegistry, RequestOptions, Settings, UserMessage,
};
use std::sync::Arc;
use std::time::Instant;

/// Probe every configured provider with a tiny non-streaming chat.
pub async fn run_doctor(settings: Settings) -> anyhow::Result<()> {
    let provider = OpenAiCompatibleProvider::from_settings(&settings);
    let registry = ProviderRegistry::new(Arc::new(settings));

    println!("Credentials: {:?}", registry.settings().credentials);

    for (label, capability) in [("generation", Capability::STREAMING), ("vision", Capability::VISION)] {
        println!("\n📋 Checking {} providers...", label);
        let candidates = match registry.candidates(capability) {
            Ok(c) => c,
            Err(e) => {
                println!("  ❌ {}", e);
                continue;
            }
        };
        for target in &candidates {
            match check_provider(&provider, target).await {
                Ok(report) => println!(
                    "  ✅ {} {} ({}) replied in {}ms: {}",
                    target.name,
                    target.model_id,
                    target.masked_key(),
                    report.elapsed_ms,
                    report.reply
                ),
                Err(e) => println!(
                    "  ❌ {} {} ({}): {}",
                    target.name,
                    target.model_id,
                    target.masked_key(),
                    e
                ),
            }
        }
    }

    println!("\nDoctor check complete.");

    Ok(())
}

struct CheckReport {
    elapsed_ms: u128,
    reply: String,
}

async fn check_provider(
    provider: &dyn Provider,
    target: &ProviderConfig,
) -> anyhow::Result<CheckReport> {
    let context = ChatContext {
        system_prompt: None,
        messages: vec![UserMessage {
            content: vec![ContentBlock::text("Reply with the single word: pong")],
        }],
    };
    let options = RequestOptions {
        temperature: Some(0.0),
        max_tokens: Some(16),
    };

    let started = Instant::now();
    let reply = provider.chat(target, &context, &options).await?;
    Ok(CheckReport {
        elapsed_ms: started.elapsed().as_millis(),
        reply: reply.trim().chars().take(40).collect(),
    })
}

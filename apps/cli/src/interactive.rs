use std::io::{BufRead, Write};

use anyhow::Result;
use tracing::warn;

use rpchat_core_sdk::{
    llm::ChatClient,
    models::{Model, Provider},
    session::Transcript,
};

/**
 * \brief Interactive chat loop: one line per turn until `exit`, `quit` or end of input.
 *
 * A failed turn is reported and leaves the transcript as it was.
 */
pub async fn chat_loop<R: BufRead, W: Write>(
    client: &ChatClient,
    provider: &Provider,
    model: &Model,
    api_key: &str,
    system_prompt: Option<&str>,
    mut input: R,
    out: &mut W,
) -> Result<Transcript> {
    writeln!(
        out,
        "Starting chat session. Type 'exit' or 'quit' to end the conversation."
    )?;
    writeln!(out, "Enter your message:")?;

    let mut transcript = Transcript::new(system_prompt);
    if let Some(prompt) = system_prompt.filter(|p| !p.is_empty()) {
        writeln!(out, "System: {}", prompt)?;
    }

    let mut buf = Vec::new();
    loop {
        write!(out, "\nYou: ")?;
        out.flush()?;

        buf.clear();
        if input.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = decode_line(&buf);
        if line == "exit" || line == "quit" {
            writeln!(out, "Ending chat session.")?;
            break;
        }

        let request = client.assemble_request(
            &model.id,
            model.default_temperature,
            provider.default_max_tokens,
            transcript.with_user(&line),
            model.extra_fields.as_ref(),
        );

        writeln!(out, "\nWaiting for response...")?;
        match client.send(&request, provider, api_key).await {
            Ok(reply) => {
                writeln!(out, "\n{}: {}", model.display_name, reply.message)?;
                writeln!(
                    out,
                    "\n[Response time: {:.2}s, Tokens: {}]",
                    reply.duration.as_secs_f64(),
                    reply.total_tokens()
                )?;
                transcript.commit_turn(&line, &reply.message);
            }
            Err(e) => {
                warn!("chat turn failed: {}", e);
                writeln!(out, "Error: {}", e)?;
            }
        }
    }

    Ok(transcript)
}

/** \brief Strip the line ending; bytes that are not UTF-8 become U+FFFD. */
fn decode_line(buf: &[u8]) -> String {
    let mut end = buf.len();
    while end > 0 && matches!(buf[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

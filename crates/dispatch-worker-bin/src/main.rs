//! Runs exactly one task per process invocation: decode a signed task
//! frame from stdin, execute it against the built-in event registry, and
//! write a signed result frame to stdout. Spawned fresh by the pool for
//! every task, the Rust analogue of `multiprocessing`'s spawn start
//! method — no state survives between invocations.

use std::io::{self, Read, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use dispatch_codec::Codec;
use dispatch_registry::builtin::register_builtin;
use dispatch_registry::EventRegistry;
use dispatch_shared::{logging, DispatchError, EventResult, TaskMessage};

#[tokio::main]
async fn main() {
    logging::init_tracing();

    if let Err(err) = run().await {
        tracing::error!(error = %err, "worker process failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), DispatchError> {
    let secret_b64 = std::env::var("DISPATCH_WORKER_SECRET")
        .map_err(|_| DispatchError::Configuration("DISPATCH_WORKER_SECRET not set".into()))?;
    let secret = BASE64
        .decode(secret_b64)
        .map_err(|e| DispatchError::Configuration(format!("invalid DISPATCH_WORKER_SECRET: {e}")))?;
    let codec = Codec::new(secret);

    let registry = EventRegistry::new();
    register_builtin(&registry)?;

    let frame = read_stdin_frame()?;
    let message = codec.decode_task_message(&frame)?;
    let correlation_id = message.correlation_id_or_mint();

    let result = match registry.lookup(&message.event) {
        Some(factory) => match factory.instantiate(&correlation_id, &message.args) {
            Ok(event) => match event.invoke(&correlation_id).await {
                Ok(value) => EventResult::success(correlation_id, value),
                Err(err) => EventResult::error(correlation_id, err.code(), err.to_string()),
            },
            Err(err) => EventResult::error(correlation_id, err.code(), err.to_string()),
        },
        None => EventResult::error(
            correlation_id,
            DispatchError::EventNotRegistered(message.event.clone()).code(),
            format!("event not registered in worker process: {}", message.event),
        ),
    };

    let response_frame = codec.encode_value(&result)?;
    write_stdout_frame(&response_frame)
}

fn read_stdin_frame() -> Result<Vec<u8>, DispatchError> {
    let mut len_bytes = [0u8; 4];
    io::stdin().lock().read_exact(&mut len_bytes).map_err(DispatchError::Io)?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    let mut buf = vec![0u8; len];
    io::stdin().lock().read_exact(&mut buf).map_err(DispatchError::Io)?;
    Ok(buf)
}

fn write_stdout_frame(payload: &[u8]) -> Result<(), DispatchError> {
    let len = u32::try_from(payload.len()).map_err(|_| DispatchError::InvalidFrame("frame too large".into()))?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(&len.to_be_bytes()).map_err(DispatchError::Io)?;
    stdout.write_all(payload).map_err(DispatchError::Io)?;
    stdout.flush().map_err(DispatchError::Io)
}

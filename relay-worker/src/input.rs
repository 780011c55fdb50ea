use relay_common::payload::Payload;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::InputError;

/// Read one JSON object per line. Blank lines are skipped.
pub async fn read_payloads<R>(reader: R) -> Result<Vec<Payload>, InputError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut payloads = Vec::new();
    let mut line_number = 0;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        let payload = serde_json::from_str(&line).map_err(|source| InputError::Parse {
            line: line_number,
            source,
        })?;
        payloads.push(payload);
    }

    Ok(payloads)
}

//! Stream transformations for incremental model output.
//!
//! Providers that stream emit many small message deltas. [`MessageAggregator`]
//! folds consecutive deltas from the same speaker into one message, and
//! [`aggregate_messages`] applies it lazily to a stream.

use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::ColloquyError;
use crate::types::{Message, MessageBody, ToolCall};

/// Folds consecutive same-speaker deltas into complete messages.
///
/// Two deltas belong to the same group when they have the same variant and,
/// for role messages, the same role. The aggregate keeps the id and timestamp
/// of the first delta in the group.
#[derive(Debug, Default)]
pub struct MessageAggregator {
    current: Option<Message>,
}

impl MessageAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one delta. Returns the previous group when `delta` starts a new one.
    pub fn push(&mut self, delta: Message) -> Option<Message> {
        let Some(current) = self.current.as_mut() else {
            self.current = Some(delta);
            return None;
        };
        match merge(current, delta) {
            Ok(()) => None,
            Err(next) => self.current.replace(next),
        }
    }

    /// Flush the open group, if any.
    pub fn finish(&mut self) -> Option<Message> {
        self.current.take()
    }

    /// Aggregate a finite sequence of deltas.
    pub fn aggregate(deltas: impl IntoIterator<Item = Message>) -> Vec<Message> {
        let mut aggregator = Self::new();
        let mut out: Vec<Message> = deltas
            .into_iter()
            .filter_map(|delta| aggregator.push(delta))
            .collect();
        out.extend(aggregator.finish());
        out
    }
}

/// Merge `delta` into `into`, or hand it back when it starts a new group.
fn merge(into: &mut Message, delta: Message) -> Result<(), Message> {
    let Message {
        id,
        body,
        metadata,
        created_at,
    } = delta;

    match (&mut into.body, body) {
        (
            MessageBody::Role {
                role,
                content,
                media,
            },
            MessageBody::Role {
                role: next_role,
                content: next_content,
                media: next_media,
            },
        ) if *role == next_role => {
            content.push_str(&next_content);
            media.extend(next_media);
        }
        (MessageBody::System { content }, MessageBody::System { content: next }) => {
            content.push_str(&next);
        }
        (
            MessageBody::ToolCall {
                content,
                media,
                tool_calls,
            },
            MessageBody::ToolCall {
                content: next_content,
                media: next_media,
                tool_calls: next_calls,
            },
        ) => {
            content.push_str(&next_content);
            media.extend(next_media);
            merge_tool_calls(tool_calls, next_calls);
        }
        (
            MessageBody::ToolResponse { tool_responses },
            MessageBody::ToolResponse {
                tool_responses: next,
            },
        ) => tool_responses.extend(next),
        (_, body) => {
            return Err(Message {
                id,
                body,
                metadata,
                created_at,
            })
        }
    }

    into.metadata.extend(metadata);
    Ok(())
}

/// Argument fragments of a known call id are appended to that call; a
/// fragment without an id continues the most recent call.
fn merge_tool_calls(calls: &mut Vec<ToolCall>, fragments: Vec<ToolCall>) {
    for fragment in fragments {
        let target = if fragment.id.is_empty() {
            calls.last_mut()
        } else {
            calls.iter_mut().find(|c| c.id == fragment.id)
        };
        match target {
            Some(call) => {
                call.arguments.push_str(&fragment.arguments);
                if call.name.is_empty() {
                    call.name = fragment.name;
                }
            }
            None => calls.push(fragment),
        }
    }
}

/// Lazily aggregate a stream of deltas into a stream of complete messages.
///
/// A stream error flushes the open group first, is yielded, and ends the stream.
pub fn aggregate_messages<'a>(
    stream: BoxStream<'a, Result<Message, ColloquyError>>,
) -> BoxStream<'a, Result<Message, ColloquyError>> {
    let aggregated = async_stream::stream! {
        let mut inner = stream;
        let mut aggregator = MessageAggregator::new();
        while let Some(item) = inner.next().await {
            match item {
                Ok(delta) => {
                    if let Some(done) = aggregator.push(delta) {
                        yield Ok(done);
                    }
                }
                Err(e) => {
                    if let Some(done) = aggregator.finish() {
                        yield Ok(done);
                    }
                    yield Err(e);
                    break;
                }
            }
        }
        if let Some(done) = aggregator.finish() {
            yield Ok(done);
        }
    };
    Box::pin(aggregated)
}

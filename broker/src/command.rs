use std::fmt;
use std::str::FromStr;

use database_adapter::{ProductId, Quantity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const UPDATE_STOCK_QUANTITY: &str = "update_stock_quantity";

/// A requested mutation, queued by producers and applied by the worker
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Set the stock quantity of a product
    UpdateStockQuantity {
        product_id: ProductId,
        new_quantity: Quantity,
    },
    /// A command whose kind this build does not know how to apply
    Unrecognized { kind: String, payload: Value },
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid command envelope: {0}")]
    InvalidEnvelope(#[from] serde_json::Error),
    #[error("malformed `{kind}` payload: {source}")]
    MalformedPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Wire shape of a command: `{ "kind": "...", "payload": { ... } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct UpdateStockQuantityPayload {
    product_id: ProductId,
    new_quantity: Quantity,
}

impl Command {
    #[must_use]
    pub fn update_stock_quantity(product_id: ProductId, new_quantity: Quantity) -> Self {
        Self::UpdateStockQuantity {
            product_id,
            new_quantity,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::UpdateStockQuantity { .. } => UPDATE_STOCK_QUANTITY,
            Self::Unrecognized { kind, .. } => kind,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpdateStockQuantity {
                product_id,
                new_quantity,
            } => write!(
                f,
                "update stock quantity of product {product_id} to {new_quantity}"
            ),
            Self::Unrecognized { kind, .. } => write!(f, "unrecognized `{kind}` command"),
        }
    }
}

impl CommandEnvelope {
    /// Decode the payload for a known kind. Unknown kinds are kept as
    /// [`Command::Unrecognized`] so the worker can report and skip them.
    /// # Errors
    /// - Returns `CommandError::MalformedPayload` if a known kind carries a bad payload
    pub fn into_command(self) -> Result<Command, CommandError> {
        match self.kind.as_str() {
            UPDATE_STOCK_QUANTITY => {
                let payload: UpdateStockQuantityPayload = serde_json::from_value(self.payload)
                    .map_err(|source| CommandError::MalformedPayload {
                        kind: self.kind.clone(),
                        source,
                    })?;
                Ok(Command::update_stock_quantity(
                    payload.product_id,
                    payload.new_quantity,
                ))
            }
            _ => Ok(Command::Unrecognized {
                kind: self.kind,
                payload: self.payload,
            }),
        }
    }
}

impl From<Command> for CommandEnvelope {
    fn from(command: Command) -> Self {
        match command {
            Command::UpdateStockQuantity {
                product_id,
                new_quantity,
            } => Self {
                kind: UPDATE_STOCK_QUANTITY.to_string(),
                payload: serde_json::json!({
                    "product_id": product_id,
                    "new_quantity": new_quantity,
                }),
            },
            Command::Unrecognized { kind, payload } => Self { kind, payload },
        }
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str::<CommandEnvelope>(s)?.into_command()
    }
}

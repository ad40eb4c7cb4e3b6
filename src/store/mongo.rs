//! MongoDB storage driver.
//!
//! Documents are keyed by a server-style `ObjectId`; expired documents
//! are removed by the sweeper with a range filter on `expiresAt`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};

use super::{deleted_one, swept, unavailable, NewSecret, SecretStore, StoredSecret};
use crate::config::DatabaseSettings;
use crate::errors::{EmberdropError, Result};

const DEFAULT_COLLECTION: &str = "secrets";

/// On-disk document shape.
#[derive(Debug, Serialize, Deserialize)]
struct SecretDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    value: String,
    #[serde(rename = "expiresAt")]
    expires_at: BsonDateTime,
}

impl SecretDocument {
    fn into_record(self) -> Result<StoredSecret> {
        let id = self
            .id
            .ok_or_else(|| EmberdropError::SerializationError("document has no _id".into()))?;
        let expires_at = DateTime::<Utc>::from_timestamp_millis(self.expires_at.timestamp_millis())
            .ok_or_else(|| EmberdropError::SerializationError("expiresAt out of range".into()))?;

        Ok(StoredSecret {
            id: id.to_hex(),
            value: self.value,
            expires_at,
        })
    }
}

pub struct MongoStore {
    client: Client,
    secrets: Collection<SecretDocument>,
}

impl MongoStore {
    /// Connect, select the database and collection, and ping the server.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let uri = connection_uri(settings);
        let mut options = ClientOptions::parse(&uri).await.map_err(unavailable)?;
        options.app_name = Some("emberdrop".to_string());
        options.connect_timeout = Some(settings.connect_timeout);
        options.server_selection_timeout = Some(settings.connect_timeout);

        let client = Client::with_options(options).map_err(unavailable)?;
        let database = client.database(&settings.database);
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(unavailable)?;

        let collection = settings.table.as_deref().unwrap_or(DEFAULT_COLLECTION);
        Ok(Self {
            secrets: database.collection(collection),
            client,
        })
    }

    async fn find(&self, id: ObjectId) -> Result<StoredSecret> {
        self.secrets
            .find_one(doc! { "_id": id })
            .await
            .map_err(unavailable)?
            .ok_or(EmberdropError::SecretNotFound)?
            .into_record()
    }
}

#[async_trait]
impl SecretStore for MongoStore {
    async fn get(&self, id: &str) -> Result<StoredSecret> {
        self.find(parse_id(id)?).await
    }

    async fn create(&self, secret: NewSecret) -> Result<StoredSecret> {
        let document = SecretDocument {
            id: None,
            value: secret.value,
            expires_at: BsonDateTime::from_millis(secret.expires_at.timestamp_millis()),
        };

        let inserted = self
            .secrets
            .insert_one(&document)
            .await
            .map_err(unavailable)?;
        let id = inserted.inserted_id.as_object_id().ok_or_else(|| {
            EmberdropError::SerializationError("inserted _id is not an ObjectId".into())
        })?;

        // Read back so callers see the document exactly as stored.
        self.find(id).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = self
            .secrets
            .delete_one(id_filter(id)?)
            .await
            .map_err(unavailable)?;

        deleted_one(result.deleted_count)
    }

    async fn delete_expired(&self) -> Result<u64> {
        let result = self
            .secrets
            .delete_many(expired_filter(Utc::now()))
            .await
            .map_err(unavailable)?;

        swept(result.deleted_count)
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mongo"
    }
}

/// Ids that are not valid ObjectIds cannot exist in the collection.
fn parse_id(id: &str) -> Result<ObjectId> {
    ObjectId::parse_str(id).map_err(|_| EmberdropError::SecretNotFound)
}

fn id_filter(id: &str) -> Result<Document> {
    Ok(doc! { "_id": parse_id(id)? })
}

fn expired_filter(now: DateTime<Utc>) -> Document {
    doc! { "expiresAt": { "$lt": BsonDateTime::from_millis(now.timestamp_millis()) } }
}

/// Use the configured URI, or assemble one from address and credentials.
pub(crate) fn connection_uri(settings: &DatabaseSettings) -> String {
    if let Some(uri) = &settings.uri {
        return uri.clone();
    }

    let auth = match (&settings.username, &settings.password) {
        (Some(user), Some(pass)) => format!("{user}:{pass}@"),
        (Some(user), None) => format!("{user}@"),
        _ => String::new(),
    };
    let address = settings.address.as_deref().unwrap_or("localhost:27017");

    let mut uri = format!("mongodb://{auth}{address}/");
    if matches!(settings.tls_mode.as_deref(), Some(mode) if !matches!(mode, "" | "disable" | "false"))
    {
        uri.push_str("?tls=true");
    }
    uri
}

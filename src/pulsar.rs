//! Pulsar-backed mutation sender.
//!
//! One process-wide client, one lazily created producer per table topic.
//! Messages use the bus's separated key-value encoding: the AVRO-serialized
//! primary key travels base64-encoded in the partition key (which also
//! feeds key-based routing and batching), and the payload is the
//! AVRO-serialized [`MutationValue`](crate::mutation::MutationValue). The
//! registered schema is a `KeyValue` schema over the derived key record and
//! the fixed value record.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ::pulsar::{producer, proto, Authentication, Pulsar, TokioExecutor};
use tokio::sync::{Mutex, OnceCell};
use tracing::{info, warn};

use crate::config::ProducerConfig;
use crate::error::{CdcError, Result};
use crate::metrics::CdcMetrics;
use crate::mutation::{ClusterContext, Mutation};
use crate::schema;
use crate::sender::{MutationSender, SendOutcome};
use crate::table::TableMetadata;

/// Publishes mutations to per-table Pulsar topics.
pub struct PulsarMutationSender {
    config: ProducerConfig,
    context: ClusterContext,
    metrics: Arc<CdcMetrics>,
    client: OnceCell<Pulsar<TokioExecutor>>,
    producers: Mutex<HashMap<String, producer::Producer<TokioExecutor>>>,
    key_schemas: RwLock<HashMap<String, Arc<apache_avro::Schema>>>,
}

impl PulsarMutationSender {
    pub fn new(config: ProducerConfig, context: ClusterContext, metrics: Arc<CdcMetrics>) -> Self {
        Self {
            config,
            context,
            metrics,
            client: OnceCell::new(),
            producers: Mutex::new(HashMap::new()),
            key_schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Connect eagerly. The send path connects lazily on first use; call
    /// this at startup to fail fast on a bad endpoint.
    pub async fn initialize(&self) -> Result<()> {
        self.client().await?;
        Ok(())
    }

    fn topic_for<M: TableMetadata>(&self, metadata: &M) -> String {
        format!("{}{}", self.config.topic_prefix, metadata.qualified_name())
    }

    fn producer_name(&self, topic: &str) -> String {
        format!("pulsar-producer-{}-{}", self.context.node_id, topic)
    }

    async fn client(&self) -> Result<&Pulsar<TokioExecutor>> {
        self.client
            .get_or_try_init(|| self.connect())
            .await
    }

    async fn connect(&self) -> Result<Pulsar<TokioExecutor>> {
        let url = self.config.pulsar_service_url.clone();
        let mut builder = Pulsar::builder(url.clone(), TokioExecutor);

        if url.starts_with("pulsar+ssl://") {
            if let Some(path) = &self.config.ssl_keystore_path {
                builder = builder
                    .with_certificate_chain_file(path)
                    .map_err(|e| CdcError::publisher_init(format!("cannot read trust chain: {e}")))?;
            }
            builder = builder
                .with_allow_insecure_connection(self.config.ssl_allow_insecure_connection)
                .with_tls_hostname_verification_enabled(
                    self.config.ssl_hostname_verification_enable,
                );
        }
        if let Some(auth_name) = &self.config.pulsar_auth_plugin_class_name {
            builder = builder.with_auth(Authentication {
                name: auth_name.clone(),
                data: self
                    .config
                    .pulsar_auth_params
                    .clone()
                    .unwrap_or_default()
                    .into_bytes(),
            });
        }

        let client = builder
            .build()
            .await
            .map_err(|e| CdcError::publisher_init(e.to_string()))?;
        info!("Pulsar client connected to {url}");
        Ok(client)
    }

    fn key_schema<M: TableMetadata>(&self, metadata: &M) -> Result<Arc<apache_avro::Schema>> {
        let name = metadata.qualified_name();
        if let Some(found) = self
            .key_schemas
            .read()
            .expect("schema lock poisoned")
            .get(&name)
        {
            return Ok(found.clone());
        }
        let derived = Arc::new(schema::derive_key_schema(metadata)?);
        let mut schemas = self.key_schemas.write().expect("schema lock poisoned");
        Ok(schemas.entry(name).or_insert(derived).clone())
    }

    async fn create_producer(
        &self,
        client: &Pulsar<TokioExecutor>,
        topic: &str,
        key_schema: &apache_avro::Schema,
    ) -> Result<producer::Producer<TokioExecutor>> {
        let producer_name = self.producer_name(topic);
        let schema_info = proto::Schema {
            r#type: proto::schema::Type::KeyValue as i32,
            schema_data: schema::encode_key_value_schema_info(
                &key_schema.canonical_form(),
                &schema::mutation_value_schema_json(),
            ),
            properties: vec![
                proto::KeyValue {
                    key: "key.schema.type".to_string(),
                    value: "AVRO".to_string(),
                },
                proto::KeyValue {
                    key: "value.schema.type".to_string(),
                    value: "AVRO".to_string(),
                },
                proto::KeyValue {
                    key: "kv.encoding.type".to_string(),
                    value: "SEPARATED".to_string(),
                },
            ],
            ..Default::default()
        };

        let producer = client
            .producer()
            .with_topic(topic)
            .with_name(&producer_name)
            .with_options(producer::ProducerOptions {
                schema: Some(schema_info),
                batch_size: Some(1000),
                ..Default::default()
            })
            .build()
            .await?;
        info!("Pulsar producer name={producer_name} created");
        Ok(producer)
    }
}

#[async_trait]
impl<M: TableMetadata> MutationSender<M> for PulsarMutationSender {
    async fn send(&self, mutation: &Mutation<M>) -> Result<SendOutcome> {
        if !schema::is_supported(mutation.metadata.as_ref()) {
            self.metrics.record_skipped_mutation();
            return Ok(SendOutcome::Skipped);
        }

        let client = self.client().await?;
        let key_schema = self.key_schema(mutation.metadata.as_ref())?;
        let key_bytes = schema::encode_key(&key_schema, &mutation.data)?;
        let value_bytes = schema::encode_mutation_value(&mutation.mutation_value())?;
        let topic = self.topic_for(mutation.metadata.as_ref());

        let send_future = {
            let mut producers = self.producers.lock().await;
            if !producers.contains_key(&topic) {
                let producer = self.create_producer(client, &topic, &key_schema).await?;
                producers.insert(topic.clone(), producer);
            }
            let producer = producers.get_mut(&topic).expect("just inserted");
            producer
                .create_message()
                .with_content(value_bytes)
                .with_partition_key(BASE64.encode(&key_bytes))
                .send()
                .await?
        };

        match tokio::time::timeout(self.config.send_timeout, send_future).await {
            Ok(Ok(_receipt)) => Ok(SendOutcome::Published),
            Ok(Err(e)) => Err(CdcError::Pulsar(e)),
            Err(_) => Err(CdcError::publisher(format!(
                "send to {topic} timed out after {:?}",
                self.config.send_timeout
            ))),
        }
    }

    async fn close(&self) {
        let mut producers = self.producers.lock().await;
        for (topic, mut producer) in producers.drain() {
            if let Err(e) = producer.close().await {
                warn!("Closing producer for {topic} failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cql::CqlType;
    use crate::table::TableSpec;
    use uuid::Uuid;

    fn sender() -> PulsarMutationSender {
        PulsarMutationSender::new(
            ProducerConfig::default().with_topic_prefix("prefix-"),
            ClusterContext::new("cluster", Uuid::from_u128(3)),
            Arc::new(CdcMetrics::new()),
        )
    }

    #[test]
    fn test_topic_and_producer_naming() {
        let sender = sender();
        let table = TableSpec::new("ks", "t").with_partition_column("id", CqlType::Text);
        let topic = sender.topic_for(&table);
        assert_eq!(topic, "prefix-ks.t");
        assert_eq!(
            sender.producer_name(&topic),
            format!("pulsar-producer-{}-prefix-ks.t", Uuid::from_u128(3))
        );
    }

    #[test]
    fn test_key_schema_is_cached_per_table() {
        let sender = sender();
        let table = TableSpec::new("ks", "t").with_partition_column("id", CqlType::Text);
        let first = sender.key_schema(&table).unwrap();
        let second = sender.key_schema(&table).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}

//! PostgreSQL connector backed by `sqlx`.
//!
//! Queries without parameters go over the simple query protocol, so every
//! value arrives as text and column types the decoder does not know are
//! returned as strings. Parameterized queries use the extended protocol and
//! binary values; only the types listed in [`decode_column`] decode there.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::types::{PgInterval, PgMoney};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgRow, PgSslMode, PgValueFormat, PgValueRef};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::types::{Decimal, Json, Uuid};
use sqlx::{Column, Connection as SqlxConnection, Executor, Postgres, Row as SqlxRow, TypeInfo, ValueRef};
use tracing::trace;

use super::db::{Connection, Connector, Query, Row};
use crate::env::ConnectionConfig;
use crate::error::GatewayError;

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// Opens one fresh, unpooled connection per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

#[async_trait]
impl Connector for PgConnector {
	async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn Connection>, GatewayError> {
		let options = PgConnectOptions::new()
			.host(&config.host)
			.port(config.port)
			.username(&config.user)
			.password(&config.password)
			.database(&config.database)
			.ssl_mode(if config.tls { PgSslMode::Require } else { PgSslMode::Disable });

		let conn = PgConnection::connect_with(&options)
			.await
			.map_err(|source| GatewayError::Connect {
				host: config.host.clone(),
				port: config.port,
				database: config.database.clone(),
				source,
			})?;

		Ok(Box::new(PgSession { conn }))
	}
}

struct PgSession {
	conn: PgConnection,
}

#[async_trait]
impl Connection for PgSession {
	async fn query(&mut self, query: &Query) -> Result<Vec<Row>, GatewayError> {
		trace!(target = "cuke.task", sql = query.text(), params = query.params().len(), "executing query");

		let rows = if query.params().is_empty() {
			self.conn.fetch_all(query.text()).await.map_err(GatewayError::Query)?
		} else {
			let mut prepared = sqlx::query(query.text());
			for (index, value) in query.params().iter().enumerate() {
				prepared = bind_param(prepared, index + 1, value)?;
			}
			prepared.fetch_all(&mut self.conn).await.map_err(GatewayError::Query)?
		};
		rows.iter().map(row_to_json).collect()
	}

	async fn close(self: Box<Self>) -> Result<(), GatewayError> {
		self.conn.close().await.map_err(GatewayError::Close)
	}
}

fn bind_param<'q>(query: PgQuery<'q>, index: usize, value: &Value) -> Result<PgQuery<'q>, GatewayError> {
	Ok(match value {
		Value::Null => query.bind(None::<String>),
		Value::Bool(b) => query.bind(*b),
		Value::Number(n) => match (n.as_i64(), n.as_f64()) {
			(Some(i), _) => query.bind(i),
			(None, Some(f)) => query.bind(f),
			(None, None) => {
				return Err(GatewayError::UnsupportedParameter {
					index,
					message: format!("number {n} is not representable"),
				});
			}
		},
		Value::String(s) => query.bind(s.clone()),
		Value::Array(_) | Value::Object(_) => query.bind(Json(value.clone())),
	})
}

fn row_to_json(row: &PgRow) -> Result<Row, GatewayError> {
	let mut out = Row::with_capacity(row.len());
	for column in row.columns() {
		let name = column.name();
		let index = column.ordinal();
		let is_null = row
			.try_get_raw(index)
			.map(|raw| raw.is_null())
			.map_err(|source| GatewayError::Decode {
				column: name.to_string(),
				source,
			})?;

		let value = if is_null {
			Value::Null
		} else {
			decode_column(row, index, name, column.type_info().name())?
		};
		out.insert(name.to_string(), value);
	}
	Ok(out)
}

/// Decodes one non-null column. Text-format values of any other type come
/// back verbatim as strings.
fn decode_column(row: &PgRow, index: usize, name: &str, type_name: &str) -> Result<Value, GatewayError> {
	let err = |source| GatewayError::Decode {
		column: name.to_string(),
		source,
	};
	let raw = row.try_get_raw(index).map_err(err)?;
	let binary = raw.format() == PgValueFormat::Binary;

	let value = match type_name {
		"BOOL" => Value::Bool(row.try_get::<bool, _>(index).map_err(err)?),
		"INT2" => Value::from(row.try_get::<i16, _>(index).map_err(err)?),
		"INT4" => Value::from(row.try_get::<i32, _>(index).map_err(err)?),
		"INT8" => Value::from(row.try_get::<i64, _>(index).map_err(err)?),
		"FLOAT4" => Value::from(f64::from(row.try_get::<f32, _>(index).map_err(err)?)),
		"FLOAT8" => Value::from(row.try_get::<f64, _>(index).map_err(err)?),
		"TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => Value::String(row.try_get::<String, _>(index).map_err(err)?),
		"JSON" | "JSONB" => row.try_get::<Json<Value>, _>(index).map_err(err)?.0,
		"UUID" => Value::String(row.try_get::<Uuid, _>(index).map_err(err)?.to_string()),
		"TIMESTAMPTZ" => Value::String(row.try_get::<DateTime<Utc>, _>(index).map_err(err)?.to_rfc3339()),
		"TIMESTAMP" => Value::String(
			row.try_get::<NaiveDateTime, _>(index)
				.map_err(err)?
				.format("%Y-%m-%dT%H:%M:%S%.f")
				.to_string(),
		),
		"DATE" => Value::String(row.try_get::<NaiveDate, _>(index).map_err(err)?.to_string()),
		"TIME" => Value::String(row.try_get::<NaiveTime, _>(index).map_err(err)?.to_string()),
		"BYTEA" => Value::from(row.try_get::<Vec<u8>, _>(index).map_err(err)?),
		"TEXT[]" | "VARCHAR[]" => Value::from(row.try_get::<Vec<String>, _>(index).map_err(err)?),
		"INT4[]" => Value::from(row.try_get::<Vec<i32>, _>(index).map_err(err)?),
		"INT8[]" => Value::from(row.try_get::<Vec<i64>, _>(index).map_err(err)?),
		"BOOL[]" => Value::from(row.try_get::<Vec<bool>, _>(index).map_err(err)?),
		// Exact decimals stay strings so no precision is lost.
		"NUMERIC" if binary => Value::String(row.try_get::<Decimal, _>(index).map_err(err)?.to_string()),
		"MONEY" if binary => Value::String(row.try_get::<PgMoney, _>(index).map_err(err)?.to_decimal(2).to_string()),
		"INTERVAL" if binary => Value::String(format_interval(&row.try_get::<PgInterval, _>(index).map_err(err)?)),
		"INET" | "CIDR" if binary => Value::String(row.try_get::<IpNetwork, _>(index).map_err(err)?.to_string()),
		_ if !binary => Value::String(raw_text(raw).map_err(err)?),
		other => {
			return Err(GatewayError::UnsupportedColumn {
				column: name.to_string(),
				type_name: other.to_string(),
			});
		}
	};
	Ok(value)
}

fn raw_text(raw: PgValueRef<'_>) -> Result<String, sqlx::Error> {
	raw.as_str().map(str::to_string).map_err(sqlx::Error::Decode)
}

/// ISO 8601 duration, e.g. `P1M2DT3.5S`.
fn format_interval(interval: &PgInterval) -> String {
	let seconds = interval.microseconds / 1_000_000;
	let micros = (interval.microseconds % 1_000_000).abs();
	let sign = if interval.microseconds < 0 && seconds == 0 { "-" } else { "" };
	let mut out = format!("P{}M{}DT{sign}{seconds}", interval.months, interval.days);
	if micros != 0 {
		let fraction = format!("{micros:06}");
		out.push('.');
		out.push_str(fraction.trim_end_matches('0'));
	}
	out.push('S');
	out
}

use std::time::Duration;

use mongodb::{Client, Database, bson::doc, options::ClientOptions};
use tokio::time::sleep;
use tracing::debug;

use super::error::{MongoDaoError, MongoResult};

/// Pings tried before a connection attempt is reported as failed; the storage
/// supervisor retries whole attempts on top of this.
const PING_ATTEMPTS: u32 = 5;
const FIRST_PING_DELAY: Duration = Duration::from_millis(250);
const MAX_PING_DELAY: Duration = Duration::from_secs(4);

/// Delay before the ping following attempt number `attempt` (1-based).
fn ping_delay(attempt: u32) -> Duration {
    FIRST_PING_DELAY
        .saturating_mul(1 << attempt.saturating_sub(1).min(8))
        .min(MAX_PING_DELAY)
}

/// Open a client on `database_name` once the server answers a ping.
pub async fn establish_connection(
    options: &ClientOptions,
    database_name: &str,
) -> MongoResult<(Client, Database)> {
    let client = Client::with_options(options.clone())
        .map_err(|source| MongoDaoError::ClientConstruction { source })?;
    let database = client.database(database_name);

    let mut attempt = 1;
    loop {
        match database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => {
                debug!(database = database_name, attempt, "MongoDB answered ping");
                return Ok((client, database));
            }
            Err(source) if attempt >= PING_ATTEMPTS => {
                return Err(MongoDaoError::InitialPing {
                    attempts: attempt,
                    source,
                });
            }
            Err(err) => {
                debug!(database = database_name, attempt, error = %err, "MongoDB ping failed");
                sleep(ping_delay(attempt)).await;
                attempt += 1;
            }
        }
    }
}

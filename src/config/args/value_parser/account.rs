use crate::types::{AccessKeys, ClusterAccount};

const INVALID_ACCOUNT: &str = "account must be host:port:access_key:secret_key.";
const INVALID_PORT: &str = "port must be a number between 0 and 65535.";
const EMPTY_FIELD: &str = "host, access_key and secret_key must not be empty.";

pub fn check_account(account: &str) -> Result<String, String> {
    parse_account(account)?;

    Ok(account.to_string())
}

/// The secret key is the remainder after the third colon, so it may itself contain colons.
pub fn parse_account(account: &str) -> Result<ClusterAccount, String> {
    let fields: Vec<&str> = account.splitn(4, ':').collect();
    let [host, port, access_key, secret_key] = fields.as_slice() else {
        return Err(INVALID_ACCOUNT.to_string());
    };

    if host.is_empty() || access_key.is_empty() || secret_key.is_empty() {
        return Err(EMPTY_FIELD.to_string());
    }

    let port = port.parse::<u16>().map_err(|_| INVALID_PORT.to_string())?;

    Ok(ClusterAccount {
        host: host.to_string(),
        port,
        admin_keys: AccessKeys {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_valid_account() {
        init_dummy_tracing_subscriber();

        assert_eq!(
            check_account("rgw1.local:7480:admin:secret").unwrap(),
            "rgw1.local:7480:admin:secret"
        );
        assert!(check_account("10.0.0.1:80:a:b").is_ok());
    }

    #[test]
    fn parse_account_fields() {
        init_dummy_tracing_subscriber();

        let account = parse_account("rgw1.local:7480:admin:se:cr:et").unwrap();
        assert_eq!(account.host, "rgw1.local");
        assert_eq!(account.port, 7480);
        assert_eq!(account.admin_keys.access_key, "admin");
        assert_eq!(account.admin_keys.secret_key, "se:cr:et");
    }

    #[test]
    fn check_invalid_account() {
        init_dummy_tracing_subscriber();

        assert_eq!(
            check_account("rgw1.local:7480:admin").unwrap_err(),
            INVALID_ACCOUNT
        );
        assert_eq!(check_account("").unwrap_err(), INVALID_ACCOUNT);
        assert_eq!(
            check_account("rgw1.local:http:admin:secret").unwrap_err(),
            INVALID_PORT
        );
        assert_eq!(
            check_account("rgw1.local:70000:admin:secret").unwrap_err(),
            INVALID_PORT
        );
        assert_eq!(check_account(":7480:admin:secret").unwrap_err(), EMPTY_FIELD);
        assert_eq!(check_account("rgw1.local:7480::secret").unwrap_err(), EMPTY_FIELD);
        assert_eq!(check_account("rgw1.local:7480:admin:").unwrap_err(), EMPTY_FIELD);
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}

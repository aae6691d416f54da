#![allow(dead_code)]

use std::time::Duration;

use refresh_token_store::models::{NewRefreshToken, ScopeSet, TokenStoreError};
use refresh_token_store::storage::RefreshTokenRepository;

pub const CLIENT_1: &str = "c1";
pub const CLIENT_2: &str = "c2";
pub const ACCOUNT_1: &str = "a1";
pub const ACCOUNT_2: &str = "a2";

/// Insert the client and account rows the contract refers to.
pub async fn seed_sqlite(pool: &sqlx::SqlitePool) -> Result<(), sqlx::Error> {
    for (uuid, name) in [(CLIENT_1, "first client"), (CLIENT_2, "second client")] {
        sqlx::query("INSERT INTO clients (uuid, name) VALUES (?, ?)")
            .bind(uuid)
            .bind(name)
            .execute(pool)
            .await?;
    }
    for (uuid, login) in [(ACCOUNT_1, "alice"), (ACCOUNT_2, "bob")] {
        sqlx::query("INSERT INTO accounts (uuid, login, email) VALUES (?, ?, ?)")
            .bind(uuid)
            .bind(login)
            .bind(format!("{login}@example.org"))
            .execute(pool)
            .await?;
    }
    Ok(())
}

pub async fn seed_postgres(pool: &sqlx::PgPool) -> Result<(), sqlx::Error> {
    for (uuid, name) in [(CLIENT_1, "first client"), (CLIENT_2, "second client")] {
        sqlx::query("INSERT INTO clients (uuid, name) VALUES ($1, $2)")
            .bind(uuid)
            .bind(name)
            .execute(pool)
            .await?;
    }
    for (uuid, login) in [(ACCOUNT_1, "alice"), (ACCOUNT_2, "bob")] {
        sqlx::query("INSERT INTO accounts (uuid, login, email) VALUES ($1, $2, $3)")
            .bind(uuid)
            .bind(login)
            .bind(format!("{login}@example.org"))
            .execute(pool)
            .await?;
    }
    Ok(())
}

pub fn scopes(raw: &str) -> ScopeSet {
    ScopeSet::parse(raw).expect("test scopes are valid")
}

/// Lets consecutive creates get distinct `created_at` values.
pub async fn tick() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

/// Behaviour every `RefreshTokenRepository` backend must share.
///
/// Expects an empty `refresh_tokens` table and the fixtures from
/// [`seed_sqlite`] / [`seed_postgres`].
pub async fn run_repository_contract(
    repo: &dyn RefreshTokenRepository,
) -> Result<(), Box<dyn std::error::Error>> {
    // Generated token: 43 URL-safe characters, timestamps set together.
    let issued = repo
        .create(&NewRefreshToken::new(
            CLIENT_1.to_string(),
            ACCOUNT_1.to_string(),
            scopes("write read"),
        ))
        .await?;
    assert_eq!(issued.token.len(), 43);
    assert!(issued
        .token
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'));
    assert_eq!(issued.scope, scopes("read write"));
    assert_eq!(issued.created_at, issued.updated_at);

    let fetched = repo
        .get_by_token(&issued.token)
        .await?
        .ok_or_else(|| std::io::Error::other("issued token should exist"))?;
    assert_eq!(fetched, issued);

    // An empty supplied token is treated as absent.
    tick().await;
    let generated = repo
        .create(
            &NewRefreshToken::new(CLIENT_1.to_string(), ACCOUNT_1.to_string(), scopes("read"))
                .with_token(""),
        )
        .await?;
    assert_eq!(generated.token.len(), 43);
    assert_ne!(generated.token, issued.token);

    // Supplied tokens are stored verbatim and never replaced on collision.
    tick().await;
    let supplied = repo
        .create(
            &NewRefreshToken::new(CLIENT_2.to_string(), ACCOUNT_2.to_string(), ScopeSet::new())
                .with_token("supplied-token"),
        )
        .await?;
    assert_eq!(supplied.token, "supplied-token");
    assert!(supplied.scope.is_empty());

    let duplicate = repo
        .create(
            &NewRefreshToken::new(CLIENT_1.to_string(), ACCOUNT_1.to_string(), ScopeSet::new())
                .with_token("supplied-token"),
        )
        .await;
    assert!(matches!(duplicate, Err(TokenStoreError::Conflict(_))));
    let unchanged = repo.get_by_token("supplied-token").await?;
    assert_eq!(unchanged.as_ref().map(|t| t.client_uuid.as_str()), Some(CLIENT_2));

    // Unknown owners are reference errors and store nothing.
    let orphan = repo
        .create(
            &NewRefreshToken::new("missing".to_string(), ACCOUNT_1.to_string(), ScopeSet::new())
                .with_token("orphan"),
        )
        .await;
    assert!(matches!(orphan, Err(TokenStoreError::Reference(_))));
    assert!(repo.get_by_token("orphan").await?.is_none());

    // Listing is ordered by creation time.
    let all: Vec<String> = repo.list_all().await?.into_iter().map(|t| t.token).collect();
    assert_eq!(
        all,
        vec![
            issued.token.clone(),
            generated.token.clone(),
            "supplied-token".to_string()
        ]
    );

    let by_client: Vec<String> = repo
        .list_by_client(CLIENT_1)
        .await?
        .into_iter()
        .map(|t| t.token)
        .collect();
    assert_eq!(by_client, vec![issued.token.clone(), generated.token.clone()]);
    assert_eq!(repo.list_by_account(ACCOUNT_2).await?.len(), 1);
    assert!(repo.list_by_client("nobody").await?.is_empty());

    // Rotation swaps tokens and keeps the grant; replaying the old token does nothing.
    let rotated = repo
        .rotate(&issued.token, &NewRefreshToken::replacing(&issued))
        .await?
        .ok_or_else(|| std::io::Error::other("rotation should succeed"))?;
    assert_ne!(rotated.token, issued.token);
    assert_eq!(rotated.scope, issued.scope);
    assert_eq!(rotated.client_uuid, issued.client_uuid);
    assert_eq!(rotated.account_uuid, issued.account_uuid);
    assert!(repo.get_by_token(&issued.token).await?.is_none());
    assert!(repo.get_by_token(&rotated.token).await?.is_some());

    let replay = repo
        .rotate(&issued.token, &NewRefreshToken::replacing(&issued))
        .await?;
    assert!(replay.is_none());

    // A failed rotation leaves the old token in place.
    let blocked = repo
        .rotate(
            &rotated.token,
            &NewRefreshToken::replacing(&rotated).with_token("supplied-token"),
        )
        .await;
    assert!(matches!(blocked, Err(TokenStoreError::Conflict(_))));
    assert!(repo.get_by_token(&rotated.token).await?.is_some());

    // Delete is idempotent.
    repo.delete(&generated.token).await?;
    repo.delete(&generated.token).await?;
    assert!(repo.get_by_token(&generated.token).await?.is_none());

    // Remove hands back what it deleted, once.
    let removed = repo.remove("supplied-token").await?;
    assert_eq!(removed.as_ref(), Some(&supplied));
    assert!(repo.remove("supplied-token").await?.is_none());
    let readded = repo
        .create(
            &NewRefreshToken::new(CLIENT_2.to_string(), ACCOUNT_2.to_string(), ScopeSet::new())
                .with_token("supplied-token"),
        )
        .await?;
    assert_eq!(readded.token, "supplied-token");

    // Logout everywhere.
    assert_eq!(repo.delete_by_account(ACCOUNT_1).await?, 1);
    assert_eq!(repo.delete_by_account(ACCOUNT_1).await?, 0);
    assert!(repo.list_by_account(ACCOUNT_1).await?.is_empty());
    assert_eq!(repo.list_all().await?.len(), 1);

    repo.healthcheck().await?;
    Ok(())
}

/// Two concurrent creates of the same supplied token: exactly one wins.
pub async fn run_concurrent_create_contract(
    repo: &dyn RefreshTokenRepository,
) -> Result<(), Box<dyn std::error::Error>> {
    let first =
        NewRefreshToken::new(CLIENT_1.to_string(), ACCOUNT_1.to_string(), scopes("read"))
            .with_token("contended");
    let second =
        NewRefreshToken::new(CLIENT_2.to_string(), ACCOUNT_2.to_string(), scopes("write"))
            .with_token("contended");

    let (a, b) = tokio::join!(repo.create(&first), repo.create(&second));

    let outcomes = [a, b];
    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(TokenStoreError::Conflict(_))))
        .count();
    assert_eq!((wins, conflicts), (1, 1), "outcomes: {outcomes:?}");

    let stored = repo
        .get_by_token("contended")
        .await?
        .ok_or_else(|| std::io::Error::other("winner should be stored"))?;
    let winner = outcomes
        .into_iter()
        .find_map(Result::ok)
        .ok_or_else(|| std::io::Error::other("one create should win"))?;
    assert_eq!(stored, winner);
    Ok(())
}

/// Two concurrent removes of one token: exactly one gets the record back.
pub async fn run_concurrent_remove_contract(
    repo: &dyn RefreshTokenRepository,
) -> Result<(), Box<dyn std::error::Error>> {
    let issued = repo
        .create(&NewRefreshToken::new(
            CLIENT_1.to_string(),
            ACCOUNT_1.to_string(),
            scopes("read"),
        ))
        .await?;

    let (a, b) = tokio::join!(repo.remove(&issued.token), repo.remove(&issued.token));
    let removed: Vec<_> = [a?, b?].into_iter().flatten().collect();
    assert_eq!(removed, vec![issued.clone()]);
    assert!(repo.get_by_token(&issued.token).await?.is_none());
    Ok(())
}

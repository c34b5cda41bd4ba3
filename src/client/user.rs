use anyhow::Context as _;
use anyhow::bail;
use chrono::Utc;
use clap::Args;
use clap::Subcommand;

use atelier_models::prelude::*;
use database::DbConnectionPoolV2;

use crate::models::Role;
use crate::models::User;
use crate::views::auth::hash_password;

use super::PostgresConfig;

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Create an account
    Create(CreateArgs),
    /// List accounts
    List,
    /// Change the role of an account
    SetRole(SetRoleArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    username: String,
    email: String,
    password: String,
    /// `admin` or `user`
    #[arg(long, default_value = "user")]
    role: String,
}

#[derive(Args, Debug)]
pub struct SetRoleArgs {
    username: String,
    /// `admin` or `user`
    role: String,
}

fn parse_role(role: &str) -> anyhow::Result<Role> {
    role.parse()
        .with_context(|| format!("unknown role '{role}', expected 'admin' or 'user'"))
}

pub async fn user_command(command: UserCommand, postgres: PostgresConfig) -> anyhow::Result<()> {
    let pool = DbConnectionPoolV2::try_initialize(postgres.database_url, 1).await?;
    let mut conn = pool.get().await?;

    match command {
        UserCommand::Create(CreateArgs {
            username,
            email,
            password,
            role,
        }) => {
            let role = parse_role(&role)?;
            let user = User::changeset()
                .username(username)
                .email(email)
                .password_hash(hash_password(&password).map_err(|e| anyhow::anyhow!("{e}"))?)
                .role(role)
                .creation_date(Utc::now())
                .create(&mut conn)
                .await?;
            println!("created account #{} '{}'", user.id, user.username);
        }
        UserCommand::List => {
            let users = User::list(&mut conn, SelectionSettings::new()).await?;
            for user in users {
                println!("#{}\t{}\t{}\t{}", user.id, user.username, user.email, user.role);
            }
        }
        UserCommand::SetRole(SetRoleArgs { username, role }) => {
            let role = parse_role(&role)?;
            let Some(user) = User::retrieve_by_username(&mut conn, &username).await? else {
                bail!("no account named '{username}'");
            };
            User::changeset()
                .role(role)
                .update_or_fail(&mut conn, user.id, || {
                    atelier_models::Error::from(diesel::result::Error::NotFound)
                })
                .await?;
            println!("account '{username}' is now {role}");
        }
    }
    Ok(())
}

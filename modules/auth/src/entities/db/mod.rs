pub mod user_account;

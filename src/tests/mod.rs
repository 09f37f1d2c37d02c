mod auth;
mod donation_list;
mod donation_update;

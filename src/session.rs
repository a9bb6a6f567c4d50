pub const USER_EMAIL_KEY: &str = "userEmail";
pub const USER_NAME_KEY: &str = "userName";
pub const USER_PREFERENCES_KEY: &str = "userPreferences";

/// Read-only view of who is signed in.
pub trait SessionStore {
    fn user_email(&self) -> Option<String>;
}

impl<T: SessionStore + ?Sized> SessionStore for &T {
    fn user_email(&self) -> Option<String> {
        (**self).user_email()
    }
}

/// Loose `local@domain.tld` shape check, no whitespace anywhere.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

pub const MIN_PASSWORD_LEN: usize = 6;

/// Checks a signup form before anything is sent. Returns the message to show.
pub fn validate_signup(
    name: &str,
    email: &str,
    password: &str,
    confirm: &str,
) -> Result<(), &'static str> {
    if name.trim().is_empty() || email.trim().is_empty() || password.is_empty() || confirm.is_empty()
    {
        return Err("All fields are required");
    }
    if !is_valid_email(email.trim()) {
        return Err("Please enter a valid email address");
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err("Password must be at least 6 characters long");
    }
    if password != confirm {
        return Err("Passwords do not match");
    }
    Ok(())
}

/// Masque une valeur sensible pour les logs (jetons, secrets).
pub fn mask_sensitive(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let len = chars.len();
    if len <= 4 {
        return "*".repeat(len);
    }

    // Garde les 2 premiers et 2 derniers caractères
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[len - 2..].iter().collect();
    format!("{}{}{}", head, "*".repeat(len - 4), tail)
}

/// `jean.dupont@exemple.fr` -> `je*******nt@exemple.fr`
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => format!("{}@{}", mask_sensitive(local), domain),
        None => mask_sensitive(email),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_sensitive() {
        assert_eq!(mask_sensitive("MonSecret123"), "Mo********23");
        assert_eq!(mask_sensitive("abc"), "***");
        assert_eq!(mask_sensitive(""), "");
        assert_eq!(mask_sensitive("éàçùêî"), "éà**êî");
    }

    #[test]
    fn test_mask_email() {
        assert_eq!(mask_email("jean.dupont@exemple.fr"), "je*******nt@exemple.fr");
        assert_eq!(mask_email("abc@x.fr"), "***@x.fr");
    }
}

use rand::Rng;

/// 去掉易混淆字符 (0/O, 1/I)
const REFERENCE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const REFERENCE_CODE_LEN: usize = 8;

/// 生成订单参考码（8位大写字母数字），买家用于查询订单和上传付款凭证
pub fn generate_reference_code() -> String {
    let mut rng = rand::thread_rng();
    (0..REFERENCE_CODE_LEN)
        .map(|_| REFERENCE_ALPHABET[rng.gen_range(0..REFERENCE_ALPHABET.len())] as char)
        .collect()
}

/// 生成 URL slug，附带随机后缀避免冲突
pub fn generate_slug(title: &str) -> String {
    let mut base = String::with_capacity(title.len());
    let mut last_dash = true;
    for c in title.trim().chars() {
        let c = match c {
            'á' | 'à' | 'ä' | 'â' | 'Á' => 'a',
            'é' | 'è' | 'ë' | 'ê' | 'É' => 'e',
            'í' | 'ì' | 'ï' | 'î' | 'Í' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' | 'Ó' => 'o',
            'ú' | 'ù' | 'ü' | 'û' | 'Ú' => 'u',
            'ñ' | 'Ñ' => 'n',
            other => other.to_ascii_lowercase(),
        };
        if c.is_ascii_alphanumeric() {
            base.push(c);
            last_dash = false;
        } else if !last_dash {
            base.push('-');
            last_dash = true;
        }
    }
    let base = base.trim_end_matches('-');
    let base: String = base.chars().take(60).collect();
    let base = base.trim_end_matches('-');

    let mut rng = rand::thread_rng();
    let suffix: String = (0..6)
        .map(|_| {
            let chars = b"abcdefghijklmnopqrstuvwxyz0123456789";
            chars[rng.gen_range(0..chars.len())] as char
        })
        .collect();

    if base.is_empty() {
        suffix
    } else {
        format!("{base}-{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_reference_code() {
        let code = generate_reference_code();
        assert_eq!(code.len(), REFERENCE_CODE_LEN);
        assert!(code.bytes().all(|b| REFERENCE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_generate_slug() {
        let slug = generate_slug("  Gran Sorteo de Año Nuevo!! ");
        assert!(slug.starts_with("gran-sorteo-de-ano-nuevo-"), "{slug}");
        assert_eq!(slug.len(), "gran-sorteo-de-ano-nuevo-".len() + 6);
    }

    #[test]
    fn test_generate_slug_without_alphanumerics() {
        let slug = generate_slug("¡¡¡");
        assert_eq!(slug.len(), 6);
    }
}

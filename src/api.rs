
pub mod artifact;
pub mod client;
pub mod error;
pub mod experiment;
pub mod id;
pub mod run;
pub mod search;

// MLflow sends int64 either as a JSON number or as a string, depending on version.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum IntRepr {
    Int(i64),
    Str(String),
}

impl IntRepr {
    fn into_i64<E: serde::de::Error>(self) -> Result<i64, E> {
        match self {
            IntRepr::Int(int) => Ok(int),
            IntRepr::Str(s) => s.parse::<i64>().map_err(E::custom),
        }
    }
}

// serialize i64 as str
mod str_int {
    use serde::de::{Deserialize, Deserializer};
    use serde::ser::{Serialize, Serializer};

    use super::IntRepr;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>
    {
        IntRepr::deserialize(deserializer)?.into_i64()
    }

    pub fn serialize<S>(int: &i64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s: String = format!("{}", int);
        s.serialize(serializer)
    }
}

// serialize Option<i64> as Option<str>
mod opt_str_int {
    use serde::de::{Deserialize, Deserializer};
    use serde::ser::{Serialize, Serializer};

    use super::IntRepr;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>
    {
        let repr = Option::<IntRepr>::deserialize(deserializer)?;
        repr.map(IntRepr::into_i64).transpose()
    }

    pub fn serialize<S>(int: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = int.map(|int| format!("{}", int));
        s.serialize(serializer)
    }
}

// serialize f64 as a number, or as "NaN" / "Infinity" / "-Infinity" when not finite
pub(crate) mod lenient_float {
    use serde::de::{self, Deserialize, Deserializer};
    use serde::ser::Serializer;

    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum FloatRepr {
        Num(f64),
        Str(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match FloatRepr::deserialize(deserializer)? {
            FloatRepr::Num(value) => Ok(value),
            FloatRepr::Str(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "Infinity" | "inf" => Ok(f64::INFINITY),
                "-Infinity" | "-inf" => Ok(f64::NEG_INFINITY),
                other => other.parse::<f64>().map_err(de::Error::custom),
            },
        }
    }

    pub fn serialize<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_infinite() && value.is_sign_positive() {
            serializer.serialize_str("Infinity")
        } else if value.is_infinite() {
            serializer.serialize_str("-Infinity")
        } else {
            serializer.serialize_f64(*value)
        }
    }
}

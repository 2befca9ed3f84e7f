use proc_macro2::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Data, DeriveInput, Error, Field, Fields, Ident, LitStr, Result, Type};

/// A field carrying a `#[db("tag[,omitempty]")]` attribute.
struct Tagged {
    ident: Ident,
    /// The raw tag text, handed to the registry unparsed.
    raw: String,
    /// Tag name without options, used in generated match arms.
    name: String,
    omit_empty: bool,
}

/// A field carrying `#[db(flatten)]`.
struct Flattened {
    ident: Ident,
    ty: Type,
}

enum DbAttr {
    Tag(String),
    Flatten,
}

/// Reads the single `#[db(...)]` attribute of a field, if any.
fn db_attr(field: &Field) -> Result<Option<DbAttr>> {
    let mut found = None;
    for attr in &field.attrs {
        if !attr.path().is_ident("db") {
            continue;
        }
        if found.is_some() {
            return Err(Error::new(attr.span(), "duplicate #[db(...)] attribute"));
        }
        if let Ok(lit) = attr.parse_args::<LitStr>() {
            found = Some(DbAttr::Tag(lit.value()));
            continue;
        }
        if let Ok(path) = attr.parse_args::<syn::Path>() {
            if path.is_ident("flatten") {
                found = Some(DbAttr::Flatten);
                continue;
            }
        }
        return Err(Error::new(
            attr.span(),
            "expected #[db(\"tag\")], #[db(\"tag,omitempty\")] or #[db(flatten)]",
        ));
    }
    Ok(found)
}

fn valid_tag_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Splits and validates a raw tag. The runtime registry performs the same
/// checks again when it builds the descriptor; doing them here as well
/// turns the common mistakes into compile errors.
fn parse_tag(field: &Field, raw: &str) -> Result<(String, bool)> {
    let mut options = raw.split(',');
    let name = options.next().unwrap_or("");
    let mut omit_empty = false;
    for flag in options {
        if flag == "omitempty" {
            omit_empty = true;
        } else {
            return Err(Error::new(
                field.span(),
                format!("unsupported flag \"{flag}\" in tag \"{raw}\""),
            ));
        }
    }
    if name.is_empty() {
        return Err(Error::new(field.span(), "empty db tag"));
    }
    if !valid_tag_name(name) {
        return Err(Error::new(
            field.span(),
            format!("invalid column name in 'db' tag: \"{name}\""),
        ));
    }
    Ok((name.to_string(), omit_empty))
}

pub(crate) fn expand(input: DeriveInput) -> Result<TokenStream> {
    if !input.generics.params.is_empty() {
        return Err(Error::new(
            input.generics.span(),
            "Record cannot be derived for generic types",
        ));
    }

    let Data::Struct(data) = &input.data else {
        return Err(Error::new(
            input.span(),
            "Record can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(Error::new(
            input.span(),
            "Record requires named fields; use simple_record! for single-value wrappers",
        ));
    };

    let mut tagged: Vec<Tagged> = Vec::new();
    let mut flattened: Vec<Flattened> = Vec::new();
    for field in &fields.named {
        let ident = field.ident.clone().expect("named field");
        match db_attr(field)? {
            None => {}
            Some(DbAttr::Flatten) => flattened.push(Flattened {
                ident,
                ty: field.ty.clone(),
            }),
            Some(DbAttr::Tag(raw)) => {
                let (name, omit_empty) = parse_tag(field, &raw)?;
                if let Some(dup) = tagged.iter().find(|t| t.name == name) {
                    return Err(Error::new(
                        field.span(),
                        format!(
                            "db tag \"{}\" appears in both field \"{}\" and field \"{}\"",
                            name, dup.ident, ident
                        ),
                    ));
                }
                tagged.push(Tagged {
                    ident,
                    raw,
                    name,
                    omit_empty,
                });
            }
        }
    }

    let ident = &input.ident;
    let name_str = ident.to_string();

    let tag_entries = tagged.iter().map(|t| {
        let raw = &t.raw;
        let field = t.ident.to_string();
        quote! {
            fields.push(::sqlair_core::TaggedField::new(#raw, #field));
        }
    });
    let flatten_entries = flattened.iter().map(|f| {
        let ty = &f.ty;
        let outer = f.ident.to_string();
        quote! {
            fields.extend(
                <#ty as ::sqlair_core::Introspect>::tagged_fields()
                    .into_iter()
                    .map(|f| f.promoted(#outer)),
            );
        }
    });

    let owns_arms = tagged.iter().map(|t| {
        let name = &t.name;
        quote! { #name => true, }
    });
    let owns_flatten = flattened.iter().map(|f| {
        let fid = &f.ident;
        quote! { || ::sqlair_core::Record::owns_member(&self.#fid, name) }
    });

    let get_arms = tagged.iter().map(|t| {
        let name = &t.name;
        let fid = &t.ident;
        quote! {
            #name => ::std::result::Result::Ok(::sqlair_core::FieldValue::to_value(&self.#fid)),
        }
    });
    let get_flatten = flattened.iter().map(|f| {
        let fid = &f.ident;
        quote! {
            if ::sqlair_core::Record::owns_member(&self.#fid, name) {
                return ::sqlair_core::Record::get_field(&self.#fid, name);
            }
        }
    });

    let check_arms = tagged.iter().map(|t| {
        let name = &t.name;
        let fid = &t.ident;
        quote! {
            #name => {
                if value.is_null() {
                    return ::std::result::Result::Ok(());
                }
                ::sqlair_core::convert_probe(&self.#fid, value)
            }
        }
    });
    let check_flatten = flattened.iter().map(|f| {
        let fid = &f.ident;
        quote! {
            if ::sqlair_core::Record::owns_member(&self.#fid, name) {
                return ::sqlair_core::Record::check_field(&self.#fid, name, value);
            }
        }
    });

    let set_arms = tagged.iter().map(|t| {
        let name = &t.name;
        let fid = &t.ident;
        let on_null = if t.omit_empty {
            // Prior content survives a NULL.
            quote! {}
        } else {
            quote! { self.#fid = ::core::default::Default::default(); }
        };
        quote! {
            #name => {
                match value {
                    ::sqlair_core::Value::Null => { #on_null }
                    value => {
                        self.#fid = ::sqlair_core::FieldValue::from_value(value)?;
                    }
                }
                ::std::result::Result::Ok(())
            }
        }
    });
    let set_flatten = flattened.iter().map(|f| {
        let fid = &f.ident;
        quote! {
            if ::sqlair_core::Record::owns_member(&self.#fid, name) {
                return ::sqlair_core::Record::set_field(&mut self.#fid, name, value);
            }
        }
    });

    Ok(quote! {
        impl ::sqlair_core::Introspect for #ident {
            const NAME: &'static str = #name_str;
            const SHAPE: ::sqlair_core::Shape = ::sqlair_core::Shape::Record;

            fn tagged_fields() -> ::std::vec::Vec<::sqlair_core::TaggedField> {
                let mut fields = ::std::vec::Vec::new();
                #(#tag_entries)*
                #(#flatten_entries)*
                fields
            }
        }

        impl ::sqlair_core::Record for #ident {
            fn type_info(
                &self,
            ) -> ::sqlair_core::Result<::std::sync::Arc<::sqlair_core::TypeInfo>> {
                ::sqlair_core::type_info::<Self>()
            }

            #[allow(unused_variables)]
            fn owns_member(&self, name: &str) -> bool {
                match name {
                    #(#owns_arms)*
                    _ => false #(#owns_flatten)*,
                }
            }

            #[allow(unused_variables)]
            fn get_field(
                &self,
                name: &str,
            ) -> ::sqlair_core::Result<::sqlair_core::Value> {
                match name {
                    #(#get_arms)*
                    _ => {
                        #(#get_flatten)*
                        ::std::result::Result::Err(::sqlair_core::Error::Bind(format!(
                            "type \"{}\" has no \"{}\" db tag",
                            #name_str, name
                        )))
                    }
                }
            }

            #[allow(unused_variables)]
            fn check_field(
                &self,
                name: &str,
                value: &::sqlair_core::Value,
            ) -> ::sqlair_core::Result<()> {
                match name {
                    #(#check_arms)*
                    _ => {
                        #(#check_flatten)*
                        ::std::result::Result::Err(::sqlair_core::Error::Scan(format!(
                            "type \"{}\" has no \"{}\" db tag",
                            #name_str, name
                        )))
                    }
                }
            }

            #[allow(unused_variables)]
            fn set_field(
                &mut self,
                name: &str,
                value: ::sqlair_core::Value,
            ) -> ::sqlair_core::Result<()> {
                match name {
                    #(#set_arms)*
                    _ => {
                        #(#set_flatten)*
                        ::std::result::Result::Err(::sqlair_core::Error::Scan(format!(
                            "type \"{}\" has no \"{}\" db tag",
                            #name_str, name
                        )))
                    }
                }
            }
        }
    })
}
